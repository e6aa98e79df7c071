//! KYC sub-form records and derived completion

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::ParseEnumError;

/// The three sub-forms a marketer must complete before review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormKind {
    Biodata,
    GuarantorForm,
    CommitmentForm,
}

impl FormKind {
    pub const ALL: [FormKind; 3] = [
        FormKind::Biodata,
        FormKind::GuarantorForm,
        FormKind::CommitmentForm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormKind::Biodata => "biodata",
            FormKind::GuarantorForm => "guarantor_form",
            FormKind::CommitmentForm => "commitment_form",
        }
    }
}

impl fmt::Display for FormKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "biodata" => Ok(FormKind::Biodata),
            "guarantor_form" => Ok(FormKind::GuarantorForm),
            "commitment_form" => Ok(FormKind::CommitmentForm),
            other => Err(ParseEnumError::new("form_kind", other)),
        }
    }
}

/// Evidence that a sub-form was submitted. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormRecord {
    pub form_id: Uuid,
    pub marketer_id: Uuid,
    pub kind: FormKind,
    pub recorded_at: DateTime<Utc>,
}

impl FormRecord {
    pub fn new(marketer_id: Uuid, kind: FormKind) -> Self {
        Self {
            form_id: Uuid::new_v4(),
            marketer_id,
            kind,
            recorded_at: Utc::now(),
        }
    }
}

/// Per-form completion, always derived from stored records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormCompletion {
    pub biodata: bool,
    pub guarantor: bool,
    pub commitment: bool,
}

impl FormCompletion {
    pub fn get(&self, kind: FormKind) -> bool {
        match kind {
            FormKind::Biodata => self.biodata,
            FormKind::GuarantorForm => self.guarantor,
            FormKind::CommitmentForm => self.commitment,
        }
    }

    pub fn set(&mut self, kind: FormKind, present: bool) {
        match kind {
            FormKind::Biodata => self.biodata = present,
            FormKind::GuarantorForm => self.guarantor = present,
            FormKind::CommitmentForm => self.commitment = present,
        }
    }

    pub fn all(&self) -> bool {
        self.biodata && self.guarantor && self.commitment
    }

    /// Kinds still outstanding, in canonical order.
    pub fn missing(&self) -> Vec<FormKind> {
        FormKind::ALL
            .into_iter()
            .filter(|kind| !self.get(*kind))
            .collect()
    }
}
