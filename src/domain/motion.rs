//! Motion Recordings
//!
//! A recording is a CSV export of a glove capture session. The capture tool
//! writes two stacked header rows (a group row such as `Glove 1 Scaled`, then
//! the field row naming the columns), so the loader scans for the row that
//! names the delta-time column instead of assuming a fixed layout.

use crate::domain::command::MAX_ANGLE;
use crate::error::GloveError;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// Column header carrying seconds elapsed since the previous sample.
pub const TIME_COLUMN: &str = "delta time (s)";

/// Per-finger column headers, thumb first, matching the batch servo order.
pub const FINGER_COLUMNS: [&str; 5] = ["Thumb", "Index", "Middle", "Ring", "Little"];

/// One recorded row: a non-negative delta-time plus five normalized finger
/// values in [0.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct MotionSample {
    /// Seconds since the previous sample.
    pub delta_time: f64,
    /// Normalized finger positions, thumb first.
    pub fingers: [f64; 5],
}

impl MotionSample {
    /// Map the normalized finger values to servo angles:
    /// `angle = round(value * 180)`, clamped into the servo range.
    pub fn servo_angles(&self) -> [i32; 5] {
        self.fingers
            .map(|value| ((value * MAX_ANGLE as f64).round() as i32).clamp(0, MAX_ANGLE))
    }
}

/// Load an ordered sample sequence from a recording file.
pub fn load_recording(path: &Path) -> Result<Vec<MotionSample>, GloveError> {
    let file = File::open(path)
        .map_err(|e| GloveError::Recording(format!("{}: {}", path.display(), e)))?;
    read_samples(file)
}

/// Parse samples from any CSV source.
///
/// Rows before the field-header row are skipped; data rows that fail to parse
/// abort the load with the offending row number.
pub fn read_samples<R: Read>(source: R) -> Result<Vec<MotionSample>, GloveError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(source);

    let mut columns: Option<Columns> = None;
    let mut samples = Vec::new();

    for (row, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| GloveError::Recording(format!("row {}: {}", row + 1, e)))?;

        let Some(cols) = &columns else {
            if let Some(found) = Columns::locate(&record) {
                debug!("recording header found on row {}", row + 1);
                columns = Some(found);
            }
            continue;
        };

        samples.push(cols.parse_row(&record, row + 1)?);
    }

    if columns.is_none() {
        return Err(GloveError::Recording(format!(
            "no header row naming the {:?} column",
            TIME_COLUMN
        )));
    }
    debug!("loaded {} motion samples", samples.len());
    Ok(samples)
}

/// Resolved column indices for the delta-time and finger fields.
struct Columns {
    time: usize,
    fingers: [usize; 5],
}

impl Columns {
    fn locate(record: &csv::StringRecord) -> Option<Self> {
        let find = |name: &str| {
            record
                .iter()
                .position(|cell| cell.trim().eq_ignore_ascii_case(name))
        };
        let time = find(TIME_COLUMN)?;
        let mut fingers = [0usize; 5];
        for (slot, name) in fingers.iter_mut().zip(FINGER_COLUMNS) {
            *slot = find(name)?;
        }
        Some(Self { time, fingers })
    }

    fn parse_row(&self, record: &csv::StringRecord, row: usize) -> Result<MotionSample, GloveError> {
        let field = |index: usize, name: &str| -> Result<f64, GloveError> {
            let cell = record.get(index).ok_or_else(|| {
                GloveError::Recording(format!("row {}: missing {:?} column", row, name))
            })?;
            cell.trim().parse::<f64>().map_err(|_| {
                GloveError::Recording(format!("row {}: {:?} is not a number: {:?}", row, name, cell))
            })
        };

        let mut delta_time = field(self.time, TIME_COLUMN)?;
        if delta_time < 0.0 {
            warn!("row {}: negative delta time {}, treating as 0", row, delta_time);
            delta_time = 0.0;
        }

        let mut fingers = [0.0f64; 5];
        for ((slot, index), name) in fingers.iter_mut().zip(self.fingers).zip(FINGER_COLUMNS) {
            *slot = field(index, name)?;
        }

        Ok(MotionSample { delta_time, fingers })
    }
}
