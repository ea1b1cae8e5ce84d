use billing_bridge::{BillingCommand, ResponseCode};
use proptest::prelude::*;

proptest! {
    #[test]
    fn translation_is_total(code in any::<i64>()) {
        let translated = ResponseCode::from_code(Some(code));
        if (0..=8).contains(&code) {
            prop_assert_eq!(translated.code(), Some(code));
        } else {
            prop_assert_eq!(translated, ResponseCode::Unknown);
        }
        prop_assert!(!translated.as_reason().is_empty());
    }

    #[test]
    fn only_zero_is_ok(code in any::<i64>()) {
        prop_assert_eq!(ResponseCode::from(code).is_ok(), code == 0);
    }

    #[test]
    fn purchase_commands_reparse(sku in "[a-z0-9_.]{1,40}") {
        let command = BillingCommand::Purchase { sku };
        let json = command.to_json().unwrap();
        prop_assert_eq!(BillingCommand::from_json(&json).unwrap(), command);
    }
}
