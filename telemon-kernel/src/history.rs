/**
 * HISTORIQUE - Chargement du CSV d'utilisation du brûleur
 *
 * RÔLE : Lit une seule fois au démarrage le fichier `time,Indicator,Duration_hr,Consumption_MJ`
 * et le convertit en HistoricalDataset immuable.
 *
 * FONCTIONNEMENT :
 * - Horodatages sans fuseau ("2020-10-01 08:00:00") interprétés au décalage configuré
 * - Horodatages RFC 3339 acceptés tels quels
 * - Lignes invalides ignorées avec un warning, colonnes supplémentaires ignorées
 */

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use telemon_core::{Category, HistoricalDataset, HistoricalRecord};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct Row {
    time: String,
    #[serde(rename = "Indicator")]
    indicator: f64,
    #[serde(rename = "Duration_hr")]
    duration_hr: f64,
    #[serde(rename = "Consumption_MJ")]
    consumption_mj: f64,
}

pub fn load_history(path: &Path, offset: UtcOffset) -> Result<HistoricalDataset> {
    let file = std::fs::File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let dataset = read_history(file, offset).with_context(|| format!("cannot read {}", path.display()))?;
    info!("[history] loaded {} records from {}", dataset.len(), path.display());
    Ok(dataset)
}

pub fn read_history<R: Read>(reader: R, offset: UtcOffset) -> Result<HistoricalDataset> {
    let mut csv = csv::Reader::from_reader(reader);
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (index, row) in csv.deserialize::<Row>().enumerate() {
        // Header is line 1.
        let line = index + 2;
        let parsed = row
            .map_err(anyhow::Error::from)
            .and_then(|row| to_record(row, offset));
        match parsed {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("[history] line {line} skipped: {e:#}");
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        warn!("[history] {skipped} invalid rows ignored");
    }
    Ok(HistoricalDataset::new(records))
}

fn to_record(row: Row, offset: UtcOffset) -> Result<HistoricalRecord> {
    Ok(HistoricalRecord {
        time: parse_time(&row.time, offset)?,
        category: category(row.indicator)?,
        duration_hr: row.duration_hr,
        consumption_mj: row.consumption_mj,
    })
}

fn parse_time(raw: &str, offset: UtcOffset) -> Result<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(at) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(at);
    }
    let naive = PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .or_else(|_| {
            PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"))
        })
        .with_context(|| format!("unrecognised timestamp {raw:?}"))?;
    Ok(naive.assume_offset(offset))
}

/// Indicator is written as a float by some exporters ("2.0").
fn category(indicator: f64) -> Result<Category> {
    if indicator.fract() != 0.0 || indicator < 0.0 || indicator > f64::from(u32::MAX) {
        bail!("indicator {indicator} is not a position");
    }
    Ok(indicator as Category)
}
