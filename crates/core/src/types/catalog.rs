//! Listing vocabularies: where a product is, what state it is in, and how
//! people interact with it.

use crate::labeled_enum;

labeled_enum! {
    /// Cities served by the marketplace.
    pub enum City as "city" {
        Douala => "DOUALA",
        Yaounde => "YAOUNDE",
        Bafoussam => "BAFOUSSAM",
        Garoua => "GAROUA",
        Bamenda => "BAMENDA",
    }
}

impl City {
    /// Human-readable name with accents.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Douala => "Douala",
            Self::Yaounde => "Yaoundé",
            Self::Bafoussam => "Bafoussam",
            Self::Garoua => "Garoua",
            Self::Bamenda => "Bamenda",
        }
    }
}

labeled_enum! {
    /// Physical condition of a second-hand item, best first.
    pub enum Condition as "product_condition" {
        Neuf => "NEUF",
        Excellent => "EXCELLENT",
        Bon => "BON",
        Correct => "CORRECT",
        Usage => "USAGE",
    }
}

impl Condition {
    /// Human-readable label.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Neuf => "Neuf",
            Self::Excellent => "Excellent état",
            Self::Bon => "Bon état",
            Self::Correct => "État correct",
            Self::Usage => "Usagé",
        }
    }
}

labeled_enum! {
    /// Who put the product on sale.
    ///
    /// Client listings pay a commission; platform stock does not.
    pub enum ProductSource as "product_source" {
        Client => "CLIENT",
        Admin => "ADMIN",
    }
}

labeled_enum! {
    /// A tracked user action on a product.
    pub enum InteractionKind as "interaction_kind" {
        View => "VIEW",
        Like => "LIKE",
        Search => "SEARCH",
        Purchase => "PURCHASE",
        CartAdd => "CART_ADD",
        Share => "SHARE",
        ContactSeller => "CONTACT_SELLER",
    }
}

impl InteractionKind {
    /// Implicit-feedback weight used by the recommendation engine.
    #[must_use]
    pub const fn weight(&self) -> f64 {
        match self {
            Self::View | Self::Search => 1.0,
            Self::CartAdd | Self::Share => 2.0,
            Self::Like => 3.0,
            Self::ContactSeller => 4.0,
            Self::Purchase => 5.0,
        }
    }
}

labeled_enum! {
    /// Which signal produced a recommendation.
    pub enum RecommendationKind as "recommendation_kind" {
        Collaborative => "COLLABORATIVE",
        ContentBased => "CONTENT_BASED",
        Trending => "TRENDING",
        Similar => "SIMILAR",
        CrossSell => "CROSS_SELL",
        Popular => "POPULAR",
        Blended => "BLENDED",
    }
}

labeled_enum! {
    /// Analytics event families.
    pub enum AnalyticsMetric as "analytics_metric" {
        PageView => "PAGE_VIEW",
        ProductView => "PRODUCT_VIEW",
        Search => "SEARCH",
        Click => "CLICK",
        Conversion => "CONVERSION",
        Revenue => "REVENUE",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_match_serde() {
        for kind in InteractionKind::ALL {
            let json = serde_json::to_string(kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
        for kind in RecommendationKind::ALL {
            let json = serde_json::to_string(kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!("yaounde".parse::<City>().unwrap(), City::Yaounde);
        assert_eq!("CART_ADD".parse::<InteractionKind>().unwrap(), InteractionKind::CartAdd);
        let err = "LAGOS".parse::<City>().unwrap_err();
        assert_eq!(err.kind, "City");
    }

    #[test]
    fn test_interaction_weights() {
        assert!((InteractionKind::View.weight() - 1.0).abs() < f64::EPSILON);
        assert!((InteractionKind::Like.weight() - 3.0).abs() < f64::EPSILON);
        assert!((InteractionKind::Purchase.weight() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(City::Yaounde.display_name(), "Yaoundé");
        assert_eq!(Condition::Bon.display_name(), "Bon état");
    }
}
