use tracing::info;

use crate::error::PatchError;
use crate::meta::MetaStore;
use crate::options::merge_options;
use crate::patch::{Patch, PatchOutcome};

/// Adds `Account Closing Voucher` to the reference types a journal entry line
/// may point at, folding any site-level options override into the field.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetupClosingReferenceType;

impl SetupClosingReferenceType {
    pub const DOCTYPE: &'static str = "Journal Entry Account";
    pub const FIELD: &'static str = "reference_type";
    pub const OPTION: &'static str = "Account Closing Voucher";
}

impl Patch for SetupClosingReferenceType {
    fn name(&self) -> &'static str {
        "setup_account_closing_entry"
    }

    fn apply(&self, store: &dyn MetaStore) -> Result<PatchOutcome, PatchError> {
        let Some(mut field) = store.field(Self::DOCTYPE, Self::FIELD)? else {
            return Ok(PatchOutcome::Skipped {
                reason: format!("{} has no field {}", Self::DOCTYPE, Self::FIELD),
            });
        };

        let setter = store.property_setter(Self::DOCTYPE, Self::FIELD, "options")?;
        let options = merge_options(
            field.options.as_deref(),
            setter.as_ref().map(|s| s.value.as_str()),
            Self::OPTION,
        );

        if let Some(setter) = &setter {
            store.delete_property_setter(&setter.name)?;
        }

        field.options = Some(options.clone());
        store.save_field(&field)?;
        store.clear_cache(Self::DOCTYPE)?;

        info!(
            doctype = Self::DOCTYPE,
            field = Self::FIELD,
            options = %options.replace('\n', ", "),
            merged_setter = setter.is_some(),
            "reference type options updated"
        );
        Ok(PatchOutcome::Applied { detail: options })
    }
}
