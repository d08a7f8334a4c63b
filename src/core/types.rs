//! Domain model for one batch quality analysis.
//!
//! Field names follow the wire schema used by the plant's existing records
//! (camelCase Spanish). Optional fields deliberately serialize as explicit
//! `null`: the remote store must see clears, a merge write with an absent
//! key would leave the old value in place.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ============================================================================
// Record status and shift
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RecordStatus {
    #[default]
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "COMPLETED")]
    Completed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
        }
    }
}

/// Work shift a record belongs to. Classification is client-side, from the
/// local hour of the measurement: 06-14 mañana, 14-22 tarde, 22-06 noche.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Shift {
    #[default]
    #[serde(rename = "MANANA")]
    Manana,
    #[serde(rename = "TARDE")]
    Tarde,
    #[serde(rename = "NOCHE")]
    Noche,
}

impl Shift {
    pub fn classify(at: DateTime<chrono::FixedOffset>) -> Self {
        match at.hour() {
            6..=13 => Self::Manana,
            14..=21 => Self::Tarde,
            _ => Self::Noche,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manana => "MANANA",
            Self::Tarde => "TARDE",
            Self::Noche => "NOCHE",
        }
    }
}

// ============================================================================
// Draft record
// ============================================================================

/// One weight measurement, optionally with a photo of the scale reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WeightMeasurement {
    pub gramos: Option<f64>,
    pub foto: Option<String>,
}

/// One analysis pass over a sample of the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnalysisEntry {
    pub pesos: Vec<WeightMeasurement>,
    pub defectos: BTreeMap<String, u32>,
    pub observaciones: Option<String>,
    #[serde(rename = "fotoCalidad")]
    pub foto_calidad: Option<String>,
}

/// The in-progress representation of one batch's analysis. Owned by the
/// active editing session until persisted; afterwards only ever re-fetched,
/// never shared by reference across sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftRecord {
    pub id: String,
    pub producto: String,
    pub codigo: String,
    pub lote: String,
    pub talla: String,
    pub analisis: Vec<AnalysisEntry>,
    pub estado: RecordStatus,
    pub turno: Shift,
    pub analista: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "completedAt")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl DraftRecord {
    pub fn new(producto: impl Into<String>, analista: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            producto: producto.into(),
            codigo: String::new(),
            lote: String::new(),
            talla: String::new(),
            analisis: vec![AnalysisEntry::default()],
            estado: RecordStatus::InProgress,
            turno: Shift::default(),
            analista: analista.into(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Mandatory identity fields present. The auto-save guard refuses to
    /// persist a record that cannot be identified on the dashboard.
    pub fn has_identity(&self) -> bool {
        !self.codigo.trim().is_empty() && !self.lote.trim().is_empty()
    }

    pub fn complete(&mut self) {
        self.estado = RecordStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Non-finite weights cannot be serialized (serde_json refuses NaN and
    /// infinities, and so does the remote store). They become explicit nulls.
    pub fn sanitized(&self) -> Self {
        let mut out = self.clone();
        for entry in &mut out.analisis {
            for peso in &mut entry.pesos {
                if peso.gramos.is_some_and(|g| !g.is_finite()) {
                    peso.gramos = None;
                }
            }
        }
        out
    }

    pub fn photo_url(&self, field: &PhotoField) -> Option<&String> {
        match field {
            PhotoField::Quality { analysis } => {
                self.analisis.get(*analysis)?.foto_calidad.as_ref()
            }
            PhotoField::Weight { analysis, measurement } => self
                .analisis
                .get(*analysis)?
                .pesos
                .get(*measurement)?
                .foto
                .as_ref(),
        }
    }

    pub fn set_photo_url(&mut self, field: &PhotoField, url: Option<String>) {
        match field {
            PhotoField::Quality { analysis } => {
                if let Some(entry) = self.analisis.get_mut(*analysis) {
                    entry.foto_calidad = url;
                }
            }
            PhotoField::Weight { analysis, measurement } => {
                if let Some(peso) = self
                    .analisis
                    .get_mut(*analysis)
                    .and_then(|e| e.pesos.get_mut(*measurement))
                {
                    peso.foto = url;
                }
            }
        }
    }
}

// ============================================================================
// Photo field addressing
// ============================================================================

/// Addresses one photo slot in a draft: the per-analysis quality photo or a
/// per-measurement scale photo.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PhotoField {
    Quality { analysis: usize },
    Weight { analysis: usize, measurement: usize },
}

impl PhotoField {
    /// Stable key for the in-flight upload set and per-field retry counters.
    pub fn key(&self) -> String {
        match self {
            Self::Quality { analysis } => format!("analisis.{analysis}.fotoCalidad"),
            Self::Weight { analysis, measurement } => {
                format!("analisis.{analysis}.pesos.{measurement}.foto")
            }
        }
    }
}

// ============================================================================
// Backup snapshot
// ============================================================================

/// Versioned, timestamped local copy of a draft, written before every remote
/// save attempt. At most one exists at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl BackupSnapshot {
    pub fn new(version: u32, payload: serde_json::Value) -> Self {
        Self {
            version,
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ============================================================================
// Access token
// ============================================================================

/// Bearer token for the hosted stores. Mutated only by the refresh routine;
/// every reader must tolerate it being stale and re-verify before a write
/// that matters.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: String,
    pub estimated_expiry: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, estimated_expiry: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            estimated_expiry,
        }
    }

    pub fn looks_expired(&self) -> bool {
        Utc::now() >= self.estimated_expiry
    }
}
