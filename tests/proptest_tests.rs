//! Property-based tests for nagstack using proptest.
//!
//! These cover the pure building blocks whose inputs come from users: logical id
//! allocation, public key validation and suppression target matching.

use nagstack::construct::make_unique_id;
use nagstack::nag::SuppressionTarget;
use nagstack::workshop::{authorized_keys_command, validate_public_key};
use proptest::collection::vec;
use proptest::prelude::*;

// ============================================================================
// Strategies for generating test data
// ============================================================================

/// Strategy for generating construct ids as people write them
fn construct_id() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_-]{0,40}").unwrap()
}

/// Strategy for generating public keys without shell metacharacters
fn safe_key() -> impl Strategy<Value = String> {
    prop::string::string_regex("(ssh-rsa|ssh-ed25519) [A-Za-z0-9+/=]{16,80}( [a-z@.]{1,20})?")
        .unwrap()
}

// ============================================================================
// Logical ids
// ============================================================================

proptest! {
    #[test]
    fn logical_ids_are_deterministic(components in vec(construct_id(), 1..6)) {
        let parts: Vec<&str> = components.iter().map(String::as_str).collect();
        prop_assert_eq!(make_unique_id(&parts).unwrap(), make_unique_id(&parts).unwrap());
    }

    #[test]
    fn logical_ids_are_alphanumeric_and_bounded(components in vec(construct_id(), 1..6)) {
        let parts: Vec<&str> = components.iter().map(String::as_str).collect();
        let id = make_unique_id(&parts).unwrap();
        prop_assert!(!id.is_empty());
        prop_assert!(id.len() <= 255);
        prop_assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn nested_logical_ids_end_with_hash(
        parent in construct_id(),
        child in construct_id(),
    ) {
        prop_assume!(parent != "Default" && child != "Default");
        let id = make_unique_id(&[parent.as_str(), child.as_str()]).unwrap();
        let hash = &id[id.len() - 8..];
        prop_assert!(hash.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn very_long_ids_are_truncated(component in "[a-z]{300,400}") {
        let id = make_unique_id(&[component.as_str(), "Resource"]).unwrap();
        prop_assert!(id.len() <= 255);
    }
}

// ============================================================================
// Public keys
// ============================================================================

proptest! {
    #[test]
    fn safe_keys_are_accepted_and_embedded_verbatim(key in safe_key()) {
        prop_assert!(validate_public_key(&key).is_ok());
        let command = authorized_keys_command(&key);
        let expected_prefix = format!("echo \"{}\"", key);
        prop_assert!(command.starts_with(&expected_prefix));
        prop_assert!(command.ends_with(" >> /home/ubuntu/.ssh/authorized_keys"));
    }

    #[test]
    fn keys_with_shell_metacharacters_are_rejected(
        prefix in "[A-Za-z0-9 ]{0,20}",
        bad in prop::sample::select(vec!['"', '\\', '`', '$', '\n', '\r']),
        suffix in "[A-Za-z0-9 ]{0,20}",
    ) {
        let key = format!("ssh-rsa {prefix}{bad}{suffix}");
        prop_assert!(validate_public_key(&key).is_err());
    }
}

// ============================================================================
// Suppression targets
// ============================================================================

proptest! {
    #[test]
    fn literal_targets_match_only_themselves(a in "[A-Za-z:*]{1,30}", b in "[A-Za-z:*]{1,30}") {
        let target = SuppressionTarget::literal(a.clone());
        prop_assert!(target.matches(&a).unwrap());
        prop_assert_eq!(target.matches(&b).unwrap(), a == b);
    }

    #[test]
    fn anchored_regex_matches_its_prefix(rest in "[A-Za-z0-9:/*-]{0,40}") {
        let target = SuppressionTarget::regex("/^Resource::.*$/");
        let finding = format!("Resource::{rest}");
        prop_assert!(target.matches(&finding).unwrap());
    }
}
