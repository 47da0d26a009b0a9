//! Fallback del SKU de disco del OS.
//!
//! Los discos premium solo se montan en tamaños de VM premium: nombres como
//! `Standard_DS2_v2` (una `S` tras las letras de familia) o `Standard_D4ds_v5`
//! (una `s` entre las letras minúsculas tras el número de tamaño).

use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_OS_DISK_SKU: &str = "Standard_LRS";

static PREMIUM_CAPABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i:standard)_(?:[A-Z]+S\d+|[A-Z]+\d+[a-z]*s[a-z]*(?:_|$))").expect("premium sku pattern")
});

pub fn is_premium_capable(vm_sku: &str) -> bool {
    PREMIUM_CAPABLE.is_match(vm_sku.trim())
}

/// El SKU de disco propuesto si la VM lo admite, si no el default.
pub fn effective_disk_sku(proposed: &str, vm_sku: &str) -> String {
    let proposed = proposed.trim();
    if proposed.eq_ignore_ascii_case(DEFAULT_OS_DISK_SKU) || is_premium_capable(vm_sku) {
        proposed.to_string()
    } else {
        DEFAULT_OS_DISK_SKU.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn premium_capable_names() {
        for sku in ["Standard_DS2_v2", "Standard_D2s_v5", "Standard_E4ds_v5", "standard_GS1", "Standard_F8s"] {
            assert!(is_premium_capable(sku), "{sku}");
        }
        for sku in ["Standard_D2_v5", "Standard_A1", "Basic_DS2", "Standard_F8"] {
            assert!(!is_premium_capable(sku), "{sku}");
        }
    }

    #[test]
    fn falls_back_silently() {
        assert_eq!(effective_disk_sku("Premium_LRS", "Standard_D2_v5"), DEFAULT_OS_DISK_SKU);
        assert_eq!(effective_disk_sku("Premium_LRS", "Standard_D2s_v5"), "Premium_LRS");
        assert_eq!(effective_disk_sku("standard_lrs", "Standard_A1"), "standard_lrs");
    }

    proptest! {
        #[test]
        fn choice_is_a_pure_function(proposed in "[A-Za-z_]{0,16}", vm in "Standard_[A-Za-z0-9_]{1,12}") {
            let first = effective_disk_sku(&proposed, &vm);
            prop_assert_eq!(&first, &effective_disk_sku(&proposed, &vm));
            let honored = proposed.trim().eq_ignore_ascii_case(DEFAULT_OS_DISK_SKU) || is_premium_capable(&vm);
            if honored {
                prop_assert_eq!(first, proposed.trim().to_string());
            } else {
                prop_assert_eq!(first, DEFAULT_OS_DISK_SKU.to_string());
            }
        }
    }
}
