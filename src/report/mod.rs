//! Report aggregation: pure transformation of fetched records into workbook
//! rows, bucketed by date and shift. Cell formatting belongs to the export
//! layer, not here.

use crate::core::{DraftRecord, Shift};
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        out.push_str(&csv_line(&self.header));
        for row in &self.rows {
            out.push_str(&csv_line(row));
        }
        out
    }
}

fn csv_line(cells: &[String]) -> String {
    let escaped: Vec<String> = cells
        .iter()
        .map(|cell| {
            if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
                format!("\"{}\"", cell.replace('"', "\"\""))
            } else {
                cell.clone()
            }
        })
        .collect();
    format!("{}\n", escaped.join(","))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

/// Aggregates per (date, shift) bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BucketSummary {
    pub records: usize,
    pub measurements: usize,
    pub average_grams: Option<f64>,
    pub defect_totals: BTreeMap<String, u32>,
}

pub type Buckets = BTreeMap<(NaiveDate, Shift), BucketSummary>;

impl Shift {
    fn report_label(&self) -> &'static str {
        match self {
            Shift::Manana => "Mañana",
            Shift::Tarde => "Tarde",
            Shift::Noche => "Noche",
        }
    }
}

/// Buckets records by (calendar date of `updatedAt`, shift) and sums the
/// per-category defect counts and weight statistics.
pub fn bucket_records(records: &[DraftRecord]) -> Buckets {
    let mut buckets: Buckets = BTreeMap::new();
    for record in records {
        let key = (record.updated_at.date_naive(), record.turno);
        let bucket = buckets.entry(key).or_default();
        bucket.records += 1;
        let mut grams_sum = 0.0;
        let mut grams_n = 0usize;
        for entry in &record.analisis {
            for peso in &entry.pesos {
                if let Some(g) = peso.gramos.filter(|g| g.is_finite()) {
                    grams_sum += g;
                    grams_n += 1;
                }
            }
            for (defect, count) in &entry.defectos {
                *bucket.defect_totals.entry(defect.clone()).or_insert(0) += count;
            }
        }
        bucket.measurements += grams_n;
        if grams_n > 0 {
            let prior_n = bucket.measurements - grams_n;
            let prior_sum = bucket.average_grams.unwrap_or(0.0) * prior_n as f64;
            bucket.average_grams = Some((prior_sum + grams_sum) / bucket.measurements as f64);
        }
    }
    buckets
}

/// One summary sheet plus one detail sheet per date, ready for export.
pub fn build_workbook(records: &[DraftRecord]) -> Workbook {
    let buckets = bucket_records(records);

    let defect_columns: Vec<String> = {
        let mut all: Vec<String> = buckets
            .values()
            .flat_map(|b| b.defect_totals.keys().cloned())
            .collect();
        all.sort();
        all.dedup();
        all
    };

    let mut header = vec![
        "Fecha".to_string(),
        "Turno".to_string(),
        "Registros".to_string(),
        "Pesadas".to_string(),
        "Peso promedio (g)".to_string(),
    ];
    header.extend(defect_columns.iter().cloned());

    let mut rows = Vec::new();
    for ((date, shift), summary) in &buckets {
        let mut row = vec![
            date.format("%Y-%m-%d").to_string(),
            shift.report_label().to_string(),
            summary.records.to_string(),
            summary.measurements.to_string(),
            summary
                .average_grams
                .map(|g| format!("{g:.1}"))
                .unwrap_or_default(),
        ];
        for defect in &defect_columns {
            row.push(
                summary
                    .defect_totals
                    .get(defect)
                    .copied()
                    .unwrap_or(0)
                    .to_string(),
            );
        }
        rows.push(row);
    }

    let summary_sheet = Sheet {
        name: "Resumen".to_string(),
        header,
        rows,
    };

    let detail_sheet = Sheet {
        name: "Registros".to_string(),
        header: vec![
            "Fecha".into(),
            "Turno".into(),
            "Código".into(),
            "Lote".into(),
            "Producto".into(),
            "Talla".into(),
            "Analista".into(),
            "Estado".into(),
            "Observaciones".into(),
        ],
        rows: records
            .iter()
            .map(|r| {
                vec![
                    r.updated_at.date_naive().format("%Y-%m-%d").to_string(),
                    r.turno.report_label().to_string(),
                    r.codigo.clone(),
                    r.lote.clone(),
                    r.producto.clone(),
                    r.talla.clone(),
                    r.analista.clone(),
                    match r.estado {
                        crate::core::RecordStatus::InProgress => "En curso".to_string(),
                        crate::core::RecordStatus::Completed => "Completado".to_string(),
                    },
                    r.analisis
                        .iter()
                        .filter_map(|a| a.observaciones.clone())
                        .collect::<Vec<_>>()
                        .join(" / "),
                ]
            })
            .collect(),
    };

    Workbook {
        sheets: vec![summary_sheet, detail_sheet],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AnalysisEntry, WeightMeasurement};
    use chrono::{TimeZone, Utc};

    fn record(day: u32, shift: Shift, grams: &[f64], defect: (&str, u32)) -> DraftRecord {
        let mut r = DraftRecord::new("camaron", "ana");
        r.codigo = "C1".into();
        r.lote = "L1".into();
        r.turno = shift;
        r.updated_at = Utc.with_ymd_and_hms(2026, 8, day, 12, 0, 0).unwrap();
        r.analisis = vec![AnalysisEntry {
            pesos: grams
                .iter()
                .map(|g| WeightMeasurement { gramos: Some(*g), foto: None })
                .collect(),
            defectos: [(defect.0.to_string(), defect.1)].into_iter().collect(),
            observaciones: None,
            foto_calidad: None,
        }];
        r
    }

    #[test]
    fn buckets_split_by_date_and_shift() {
        let records = vec![
            record(1, Shift::Manana, &[100.0, 200.0], ("melanosis", 2)),
            record(1, Shift::Manana, &[300.0], ("melanosis", 1)),
            record(1, Shift::Tarde, &[50.0], ("olor", 4)),
            record(2, Shift::Manana, &[], ("melanosis", 3)),
        ];
        let buckets = bucket_records(&records);
        assert_eq!(buckets.len(), 3);
        let morning = &buckets[&(NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(), Shift::Manana)];
        assert_eq!(morning.records, 2);
        assert_eq!(morning.measurements, 3);
        assert_eq!(morning.average_grams, Some(200.0));
        assert_eq!(morning.defect_totals["melanosis"], 3);
    }

    #[test]
    fn workbook_has_summary_and_detail() {
        let records = vec![record(1, Shift::Manana, &[100.0], ("melanosis", 2))];
        let workbook = build_workbook(&records);
        assert_eq!(workbook.sheets.len(), 2);
        let summary = &workbook.sheets[0];
        assert!(summary.header.contains(&"melanosis".to_string()));
        assert_eq!(summary.rows.len(), 1);
        let csv = summary.to_csv();
        assert!(csv.starts_with("Fecha,Turno,"));
        assert!(csv.contains("2026-08-01"));
    }

    #[test]
    fn csv_escapes_commas_and_quotes() {
        let sheet = Sheet {
            name: "s".into(),
            header: vec!["a".into()],
            rows: vec![vec!["olor, fuerte \"x\"".into()]],
        };
        assert!(sheet.to_csv().contains("\"olor, fuerte \"\"x\"\"\""));
    }
}
