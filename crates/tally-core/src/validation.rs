//! # Validation Module
//!
//! Input validation for Tally Ops.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (UI / API surface, out of scope here)                  │
//! │  └── Basic format checks, immediate feedback                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - server-side guard clauses                       │
//! │  └── Business rule validation, enforced on EVERY mutating operation     │
//! │      independent of any client (the UI disabling a button is not a      │
//! │      guard)                                                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  └── CHECK / NOT NULL / UNIQUE / FK constraints                         │
//! │                                                                         │
//! │  Defense in depth: multiple layers catch different errors               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::{AdjustmentPatch, AdjustmentReason, NewAdjustment};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Policy
// =============================================================================

/// Maximum magnitude of a single adjustment.
///
/// Prevents fat-finger corrections (e.g. typing 100000 instead of 100).
pub const MAX_QUANTITY_ADJUSTED: i64 = 100_000;

/// Maximum length of the free-text notes field.
pub const MAX_NOTES_LEN: usize = 1_000;

/// Configured allow-list for adjustment reasons plus quantity bounds.
///
/// The default policy allows every reason in the closed set; a deployment can
/// narrow it (e.g. only `correction` during a stock-take freeze).
#[derive(Debug, Clone)]
pub struct AdjustmentPolicy {
    pub allowed_reasons: Vec<AdjustmentReason>,
    pub max_quantity: i64,
}

impl Default for AdjustmentPolicy {
    fn default() -> Self {
        AdjustmentPolicy {
            allowed_reasons: AdjustmentReason::ALL.to_vec(),
            max_quantity: MAX_QUANTITY_ADJUSTED,
        }
    }
}

// =============================================================================
// Field Validators
// =============================================================================

/// Validates an adjustment magnitude.
///
/// ## Rules
/// - Must be strictly positive (the direction lives in `adjustment_type`)
/// - Must not exceed the policy maximum
pub fn validate_quantity_adjusted(quantity: i64, policy: &AdjustmentPolicy) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity_adjusted".to_string(),
        });
    }

    if quantity > policy.max_quantity {
        return Err(ValidationError::OutOfRange {
            field: "quantity_adjusted".to_string(),
            min: 1,
            max: policy.max_quantity,
        });
    }

    Ok(())
}

/// Validates a reason against the configured allow-list.
pub fn validate_reason(reason: AdjustmentReason, policy: &AdjustmentPolicy) -> ValidationResult<()> {
    if policy.allowed_reasons.contains(&reason) {
        Ok(())
    } else {
        Err(ValidationError::NotAllowed {
            field: "reason".to_string(),
            allowed: policy
                .allowed_reasons
                .iter()
                .map(|r| r.to_string())
                .collect(),
        })
    }
}

/// Validates optional free-text notes.
pub fn validate_notes(notes: Option<&str>) -> ValidationResult<()> {
    if let Some(notes) = notes {
        if notes.len() > MAX_NOTES_LEN {
            return Err(ValidationError::TooLong {
                field: "notes".to_string(),
                max: MAX_NOTES_LEN,
            });
        }
    }
    Ok(())
}

/// Validates an entity id (product, adjustment, employee).
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Alphanumeric plus hyphens and underscores
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a product name.
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

// =============================================================================
// Request Validators
// =============================================================================

/// Validates a full adjustment proposal. Product existence is checked by the
/// storage layer, which is the only place that can answer it.
pub fn validate_new_adjustment(
    input: &NewAdjustment,
    policy: &AdjustmentPolicy,
) -> ValidationResult<()> {
    validate_id("product_id", &input.product_id)?;
    validate_quantity_adjusted(input.quantity_adjusted, policy)?;
    validate_reason(input.reason, policy)?;
    validate_notes(input.notes.as_deref())?;
    Ok(())
}

/// Validates the populated fields of an adjustment patch.
/// Re-validates exactly as `propose` does; untouched fields were validated
/// when they were last written.
pub fn validate_adjustment_patch(
    patch: &AdjustmentPatch,
    policy: &AdjustmentPolicy,
) -> ValidationResult<()> {
    if let Some(product_id) = &patch.product_id {
        validate_id("product_id", product_id)?;
    }
    if let Some(quantity) = patch.quantity_adjusted {
        validate_quantity_adjusted(quantity, policy)?;
    }
    if let Some(reason) = patch.reason {
        validate_reason(reason, policy)?;
    }
    if let Some(notes) = &patch.notes {
        validate_notes(notes.as_deref())?;
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AdjustmentType;
    use chrono::NaiveDate;

    fn new_adjustment() -> NewAdjustment {
        NewAdjustment {
            product_id: "prod-1".to_string(),
            adjustment_type: AdjustmentType::Increase,
            quantity_adjusted: 10,
            reason: AdjustmentReason::Correction,
            adjustment_date: NaiveDate::from_ymd_opt(2026, 8, 30).unwrap(),
            notes: None,
        }
    }

    #[test]
    fn test_valid_proposal_passes() {
        let policy = AdjustmentPolicy::default();
        assert!(validate_new_adjustment(&new_adjustment(), &policy).is_ok());
    }

    #[test]
    fn test_non_positive_quantity_rejected() {
        let policy = AdjustmentPolicy::default();
        for quantity in [0, -1, -100] {
            let mut input = new_adjustment();
            input.quantity_adjusted = quantity;
            let err = validate_new_adjustment(&input, &policy).unwrap_err();
            assert!(matches!(err, ValidationError::MustBePositive { .. }));
        }
    }

    #[test]
    fn test_quantity_over_policy_max_rejected() {
        let policy = AdjustmentPolicy::default();
        let mut input = new_adjustment();
        input.quantity_adjusted = policy.max_quantity + 1;
        let err = validate_new_adjustment(&input, &policy).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { .. }));
    }

    #[test]
    fn test_reason_outside_allow_list_rejected() {
        let policy = AdjustmentPolicy {
            allowed_reasons: vec![AdjustmentReason::Correction],
            ..AdjustmentPolicy::default()
        };

        assert!(validate_reason(AdjustmentReason::Correction, &policy).is_ok());

        let err = validate_reason(AdjustmentReason::Damage, &policy).unwrap_err();
        match err {
            ValidationError::NotAllowed { field, allowed } => {
                assert_eq!(field, "reason");
                assert_eq!(allowed, vec!["correction".to_string()]);
            }
            other => panic!("expected NotAllowed, got {other:?}"),
        }
    }

    #[test]
    fn test_notes_length_limit() {
        assert!(validate_notes(Some("fine")).is_ok());
        assert!(validate_notes(None).is_ok());

        let long = "x".repeat(MAX_NOTES_LEN + 1);
        assert!(validate_notes(Some(&long)).is_err());
    }

    #[test]
    fn test_patch_validates_only_populated_fields() {
        let policy = AdjustmentPolicy::default();

        let empty = AdjustmentPatch::default();
        assert!(validate_adjustment_patch(&empty, &policy).is_ok());

        let bad = AdjustmentPatch {
            quantity_adjusted: Some(0),
            ..AdjustmentPatch::default()
        };
        assert!(validate_adjustment_patch(&bad, &policy).is_err());
    }

    #[test]
    fn test_patch_notes_two_level_option() {
        let policy = AdjustmentPolicy::default();

        // Clearing notes is always valid.
        let clear = AdjustmentPatch {
            notes: Some(None),
            ..AdjustmentPatch::default()
        };
        assert!(validate_adjustment_patch(&clear, &policy).is_ok());

        let replace = AdjustmentPatch {
            notes: Some(Some("recount after delivery".to_string())),
            ..AdjustmentPatch::default()
        };
        assert!(validate_adjustment_patch(&replace, &policy).is_ok());

        let too_long = AdjustmentPatch {
            notes: Some(Some("x".repeat(MAX_NOTES_LEN + 1))),
            ..AdjustmentPatch::default()
        };
        assert!(validate_adjustment_patch(&too_long, &policy).is_err());
    }

    #[test]
    fn test_sku_rules() {
        assert!(validate_sku("WID-330").is_ok());
        assert!(validate_sku("").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(100)).is_err());
    }
}
