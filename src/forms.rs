//! Form Completion Tracker
//!
//! Pure fact store for the three KYC sub-forms. Completion is always answered
//! by looking at stored records; there is no cached "submitted" flag to drift.

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use fieldforce_types::{
    FormCompletion, FormKind, FormRecord, Role, VerificationStatus, VerificationSubmission,
};

use crate::error::{Result, VerificationError};
use crate::hierarchy::expect_role;
use crate::store::VerificationStore;

pub struct FormCompletionTracker {
    store: Arc<dyn VerificationStore>,
}

impl FormCompletionTracker {
    pub fn new(store: Arc<dyn VerificationStore>) -> Self {
        Self { store }
    }

    /// Record a submitted form. Resubmissions append; the latest wins.
    pub async fn record_submission(&self, marketer_id: Uuid, kind: FormKind) -> Result<FormRecord> {
        let marketer = self
            .store
            .get_user(marketer_id)
            .await?
            .ok_or(VerificationError::NotFound {
                entity: "user",
                id: marketer_id,
            })?;
        expect_role(&marketer, Role::Marketer)?;

        let record = FormRecord::new(marketer_id, kind);
        self.store.insert_form_record(&record).await?;
        info!("Recorded {} for marketer {}", kind, marketer_id);
        Ok(record)
    }

    pub async fn is_complete(&self, marketer_id: Uuid) -> Result<FormCompletion> {
        let records = self.store.form_records(marketer_id, None).await?;
        let current = self.store.current_submission(marketer_id).await?;
        let completion = completion_from(&records, current.as_ref());
        debug!("Form completion for {}: {:?}", marketer_id, completion);
        Ok(completion)
    }

    /// Latest record per kind, in canonical kind order.
    pub async fn latest_records(&self, marketer_id: Uuid) -> Result<Vec<FormRecord>> {
        let records = self.store.form_records(marketer_id, None).await?;
        Ok(FormKind::ALL
            .into_iter()
            .filter_map(|kind| latest_of(&records, kind).cloned())
            .collect())
    }

    pub async fn form_history(&self, marketer_id: Uuid, kind: FormKind) -> Result<Vec<FormRecord>> {
        Ok(self.store.form_records(marketer_id, Some(kind)).await?)
    }
}

/// Derive completion from stored records.
///
/// A form counts if a record exists, unless the marketer's current submission
/// is a rejection demanding that form again and the latest record predates
/// the rejection.
pub fn completion_from(
    records: &[FormRecord],
    current: Option<&VerificationSubmission>,
) -> FormCompletion {
    let rejection = current
        .filter(|s| s.status == VerificationStatus::Rejected)
        .and_then(|s| s.rejected_at.map(|at| (at, s.resubmit_forms.as_slice())));

    let mut completion = FormCompletion::default();
    for kind in FormKind::ALL {
        let present = match (latest_of(records, kind), rejection) {
            (None, _) => false,
            (Some(record), Some((rejected_at, resubmit))) if resubmit.contains(&kind) => {
                record.recorded_at > rejected_at
            }
            (Some(_), _) => true,
        };
        completion.set(kind, present);
    }
    completion
}

fn latest_of(records: &[FormRecord], kind: FormKind) -> Option<&FormRecord> {
    records
        .iter()
        .filter(|r| r.kind == kind)
        .max_by_key(|r| r.recorded_at)
}
