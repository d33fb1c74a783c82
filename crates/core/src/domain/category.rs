use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-category policy consulted on create and submit. The spending
/// limit is informational: it changes escalation routing, never a hard
/// block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPolicy {
    pub name: String,
    pub requires_approval: bool,
    pub requires_receipt: bool,
    pub spending_limit: Decimal,
    pub is_active: bool,
}

impl CategoryPolicy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: normalize_category(&name.into()),
            requires_approval: true,
            requires_receipt: true,
            spending_limit: Decimal::ZERO,
            is_active: true,
        }
    }

    pub fn auto_approvable(mut self) -> Self {
        self.requires_approval = false;
        self
    }

    pub fn receipt_exempt(mut self) -> Self {
        self.requires_receipt = false;
        self
    }

    pub fn with_spending_limit(mut self, limit: Decimal) -> Self {
        self.spending_limit = limit;
        self
    }
}

/// Built-in category set; installations may register extensions through
/// the policy store.
pub fn builtin_categories() -> Vec<CategoryPolicy> {
    vec![
        CategoryPolicy::new("travel"),
        CategoryPolicy::new("food").auto_approvable(),
        CategoryPolicy::new("accommodation"),
        CategoryPolicy::new("office_supplies").auto_approvable(),
        CategoryPolicy::new("others").receipt_exempt(),
    ]
}

pub fn normalize_category(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}

#[cfg(test)]
mod tests {
    use super::{builtin_categories, normalize_category};

    #[test]
    fn category_keys_are_normalized() {
        assert_eq!(normalize_category(" Office Supplies "), "office_supplies");
        assert_eq!(normalize_category("TRAVEL"), "travel");
    }

    #[test]
    fn builtins_cover_the_fixed_set() {
        let names: Vec<String> =
            builtin_categories().into_iter().map(|policy| policy.name).collect();
        assert_eq!(names, ["travel", "food", "accommodation", "office_supplies", "others"]);
    }
}
