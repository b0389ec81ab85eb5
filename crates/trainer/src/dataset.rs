//! Trip record loading
//!
//! Reads taxi trip files (parquet or CSV) from an HTTP(S) URL or a local
//! path into typed [`TripRecord`]s. Rows with a null in any required column,
//! or a trip distance that is not a finite non-negative number, are skipped
//! and counted. A missing required column is fatal.

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime};
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::errors::{Result, TrainerError};

/// Yellow-taxi pickup column, tried when the configured one is absent
pub const YELLOW_PICKUP_COLUMN: &str = "tpep_pickup_datetime";
/// Yellow-taxi dropoff column, tried when the configured one is absent
pub const YELLOW_DROPOFF_COLUMN: &str = "tpep_dropoff_datetime";

/// One raw taxi trip
#[derive(Debug, Clone, PartialEq)]
pub struct TripRecord {
    pub pickup: NaiveDateTime,
    pub dropoff: NaiveDateTime,
    pub pu_location_id: i64,
    pub do_location_id: i64,
    pub trip_distance: f64,
}

/// Trip records of one split
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripTable {
    pub records: Vec<TripRecord>,
    /// Rows skipped because a required value was null or out of domain
    pub skipped_rows: usize,
}

impl TripTable {
    pub fn from_records(records: Vec<TripRecord>) -> Self {
        Self {
            records,
            skipped_rows: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Source column names for the fields of a [`TripRecord`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    pub pickup: String,
    pub dropoff: String,
    pub pu_location: String,
    pub do_location: String,
    pub trip_distance: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            pickup: "lpep_pickup_datetime".to_string(),
            dropoff: "lpep_dropoff_datetime".to_string(),
            pu_location: "PULocationID".to_string(),
            do_location: "DOLocationID".to_string(),
            trip_distance: "trip_distance".to_string(),
        }
    }
}

const PICKUP: usize = 0;
const DROPOFF: usize = 1;
const PU_LOCATION: usize = 2;
const DO_LOCATION: usize = 3;
const TRIP_DISTANCE: usize = 4;

/// Positions of the required columns within a file's columns
struct ResolvedColumns {
    positions: [usize; 5],
    names: [String; 5],
}

impl ColumnConfig {
    fn resolve(&self, available: &[String], origin: &str) -> Result<ResolvedColumns> {
        let find = |name: &str| {
            available
                .iter()
                .position(|column| column == name)
                .map(|pos| (pos, name.to_string()))
        };
        let require = |name: &str, fallback: Option<&str>| {
            find(name)
                .or_else(|| fallback.and_then(find))
                .ok_or_else(|| TrainerError::MissingColumn {
                    column: name.to_string(),
                    origin: origin.to_string(),
                })
        };

        let resolved = [
            require(self.pickup.as_str(), Some(YELLOW_PICKUP_COLUMN))?,
            require(self.dropoff.as_str(), Some(YELLOW_DROPOFF_COLUMN))?,
            require(self.pu_location.as_str(), None)?,
            require(self.do_location.as_str(), None)?,
            require(self.trip_distance.as_str(), None)?,
        ];
        debug!(origin, columns = ?resolved, "Resolved trip columns");

        Ok(ResolvedColumns {
            positions: resolved.clone().map(|(pos, _)| pos),
            names: resolved.map(|(_, name)| name),
        })
    }
}

/// Where a split is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Remote(Url),
    Local(PathBuf),
}

impl DataSource {
    pub fn parse(locator: &str) -> Result<Self> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(TrainerError::Dataset("empty data locator".to_string()));
        }

        match Url::parse(locator) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(DataSource::Remote(url)),
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(DataSource::Local)
                .map_err(|_| TrainerError::Dataset(format!("invalid file URL: {locator}"))),
            _ => Ok(DataSource::Local(PathBuf::from(locator))),
        }
    }

    fn file_name(&self) -> Option<String> {
        match self {
            DataSource::Remote(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .map(str::to_string),
            DataSource::Local(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
        }
    }
}

/// On-disk format of a trip file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Parquet,
    Csv,
}

impl DataFormat {
    /// Format from the extension of the source's file name
    pub fn of(source: &DataSource) -> Result<Self> {
        let name = source.file_name().unwrap_or_default().to_ascii_lowercase();
        match Path::new(&name).extension().and_then(|ext| ext.to_str()) {
            Some("parquet") => Ok(DataFormat::Parquet),
            Some("csv") => Ok(DataFormat::Csv),
            _ => Err(TrainerError::UnsupportedFormat(format!(
                "{source:?}: expected a .parquet or .csv file"
            ))),
        }
    }
}

/// Loads trip tables from remote or local files
#[derive(Debug, Clone)]
pub struct TripLoader {
    columns: ColumnConfig,
    timeout: Duration,
}

impl TripLoader {
    pub fn new(columns: ColumnConfig) -> Self {
        Self {
            columns,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn columns(&self) -> &ColumnConfig {
        &self.columns
    }

    /// Load the trips at `locator` (URL or path)
    pub fn load(&self, locator: &str) -> Result<TripTable> {
        let source = DataSource::parse(locator)?;
        let format = DataFormat::of(&source)?;

        let data = match &source {
            DataSource::Remote(url) => self.fetch(url)?,
            DataSource::Local(path) => Bytes::from(std::fs::read(path)?),
        };

        let table = self.read(data, format, locator)?;
        info!(
            source = locator,
            rows = table.len(),
            skipped = table.skipped_rows,
            "Loaded trip records"
        );
        Ok(table)
    }

    /// Decode an in-memory trip file
    pub fn read(&self, data: Bytes, format: DataFormat, origin: &str) -> Result<TripTable> {
        match format {
            DataFormat::Parquet => self.read_parquet(data, origin),
            DataFormat::Csv => self.read_csv(&data, origin),
        }
    }

    fn fetch(&self, url: &Url) -> Result<Bytes> {
        info!(%url, "Downloading trip data");
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        let response = client.get(url.clone()).send()?.error_for_status()?;
        Ok(response.bytes()?)
    }

    fn read_parquet(&self, data: Bytes, origin: &str) -> Result<TripTable> {
        let reader = SerializedFileReader::new(data)?;
        let available: Vec<String> = reader
            .metadata()
            .file_metadata()
            .schema_descr()
            .root_schema()
            .get_fields()
            .iter()
            .map(|field| field.name().to_string())
            .collect();
        let columns = self.columns.resolve(&available, origin)?;

        let mut table = TripTable::default();
        for (row_idx, row) in reader.get_row_iter(None)?.enumerate() {
            let row = row?;
            let fields: Vec<&Field> = row.get_column_iter().map(|(_, field)| field).collect();
            let cells = columns
                .positions
                .map(|pos| fields.get(pos).map_or(Cell::Null, |field| parquet_cell(field)));
            table.push(build_record(&cells, &columns, row_idx, origin)?);
        }
        Ok(table)
    }

    fn read_csv(&self, data: &[u8], origin: &str) -> Result<TripTable> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(data);
        let available: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let columns = self.columns.resolve(&available, origin)?;

        let mut table = TripTable::default();
        for (row_idx, record) in reader.records().enumerate() {
            let record = record?;
            let cells = columns.positions.map(|pos| match record.get(pos) {
                Some(text) if !text.is_empty() => Cell::Text(text),
                _ => Cell::Null,
            });
            table.push(build_record(&cells, &columns, row_idx, origin)?);
        }
        Ok(table)
    }
}

impl TripTable {
    fn push(&mut self, record: Option<TripRecord>) {
        match record {
            Some(record) => self.records.push(record),
            None => self.skipped_rows += 1,
        }
    }
}

/// A raw value from either file format
#[derive(Debug, Clone, Copy)]
enum Cell<'a> {
    Null,
    Int(i64),
    Float(f64),
    TimestampMicros(i64),
    Text(&'a str),
    Unsupported(&'static str),
}

fn parquet_cell(field: &Field) -> Cell<'_> {
    match field {
        Field::Null => Cell::Null,
        Field::Byte(v) => Cell::Int(i64::from(*v)),
        Field::Short(v) => Cell::Int(i64::from(*v)),
        Field::Int(v) => Cell::Int(i64::from(*v)),
        Field::Long(v) => Cell::Int(*v),
        Field::UByte(v) => Cell::Int(i64::from(*v)),
        Field::UShort(v) => Cell::Int(i64::from(*v)),
        Field::UInt(v) => Cell::Int(i64::from(*v)),
        Field::ULong(v) => i64::try_from(*v).map_or(Cell::Unsupported("u64 out of range"), Cell::Int),
        Field::Float(v) => Cell::Float(f64::from(*v)),
        Field::Double(v) => Cell::Float(*v),
        Field::Str(s) => Cell::Text(s.as_str()),
        Field::TimestampMillis(ms) => ms
            .checked_mul(1_000)
            .map_or(Cell::Unsupported("timestamp out of range"), Cell::TimestampMicros),
        Field::TimestampMicros(us) => Cell::TimestampMicros(*us),
        _ => Cell::Unsupported("unsupported parquet type"),
    }
}

impl Cell<'_> {
    fn timestamp(self) -> std::result::Result<Option<NaiveDateTime>, String> {
        match self {
            Cell::Null => Ok(None),
            Cell::TimestampMicros(us) => DateTime::from_timestamp_micros(us)
                .map(|dt| Some(dt.naive_utc()))
                .ok_or_else(|| format!("timestamp out of range: {us}")),
            // Bare INT64 timestamps are nanoseconds since the epoch
            Cell::Int(ns) => Ok(Some(DateTime::from_timestamp_nanos(ns).naive_utc())),
            Cell::Text(text) => parse_timestamp(text).map(Some),
            Cell::Float(_) => Err("expected a timestamp, found a float".to_string()),
            Cell::Unsupported(what) => Err(what.to_string()),
        }
    }

    fn integer(self) -> std::result::Result<Option<i64>, String> {
        match self {
            Cell::Null => Ok(None),
            Cell::Int(v) => Ok(Some(v)),
            Cell::Float(v) if v.is_nan() => Ok(None),
            Cell::Float(v) => integral(v).map(Some),
            Cell::Text(text) => match text.parse::<i64>() {
                Ok(v) => Ok(Some(v)),
                Err(_) => text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid integer {text:?}"))
                    .and_then(integral)
                    .map(Some),
            },
            Cell::TimestampMicros(_) => Err("expected an integer, found a timestamp".to_string()),
            Cell::Unsupported(what) => Err(what.to_string()),
        }
    }

    fn real(self) -> std::result::Result<Option<f64>, String> {
        match self {
            Cell::Null => Ok(None),
            Cell::Int(v) => Ok(Some(v as f64)),
            Cell::Float(v) => Ok(Some(v).filter(|v| v.is_finite())),
            Cell::Text(text) => text
                .parse::<f64>()
                .map(|v| Some(v).filter(|v| v.is_finite()))
                .map_err(|_| format!("invalid number {text:?}")),
            Cell::TimestampMicros(_) => Err("expected a number, found a timestamp".to_string()),
            Cell::Unsupported(what) => Err(what.to_string()),
        }
    }
}

fn integral(v: f64) -> std::result::Result<i64, String> {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Ok(v as i64)
    } else {
        Err(format!("expected an integer, found {v}"))
    }
}

/// Parse `2021-01-01 00:15:56`, optionally with fractional seconds, a `T`
/// separator or an RFC 3339 offset
pub fn parse_timestamp(text: &str) -> std::result::Result<NaiveDateTime, String> {
    const FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.naive_utc())
        })
        .ok_or_else(|| format!("invalid timestamp {text:?}"))
}

fn build_record(
    cells: &[Cell<'_>; 5],
    columns: &ResolvedColumns,
    row_idx: usize,
    origin: &str,
) -> Result<Option<TripRecord>> {
    let context = |column: usize, message: String| {
        TrainerError::Dataset(format!(
            "{origin}: row {}, column {}: {message}",
            row_idx + 1,
            columns.names[column]
        ))
    };

    let pickup = cells[PICKUP].timestamp().map_err(|e| context(PICKUP, e))?;
    let dropoff = cells[DROPOFF].timestamp().map_err(|e| context(DROPOFF, e))?;
    let pu = cells[PU_LOCATION]
        .integer()
        .map_err(|e| context(PU_LOCATION, e))?;
    let dox = cells[DO_LOCATION]
        .integer()
        .map_err(|e| context(DO_LOCATION, e))?;
    // NaN, infinite and negative distances count as missing
    let distance = cells[TRIP_DISTANCE]
        .real()
        .map_err(|e| context(TRIP_DISTANCE, e))?
        .filter(|distance| *distance >= 0.0);

    Ok(match (pickup, dropoff, pu, dox, distance) {
        (Some(pickup), Some(dropoff), Some(pu), Some(dox), Some(distance)) => Some(TripRecord {
            pickup,
            dropoff,
            pu_location_id: pu,
            do_location_id: dox,
            trip_distance: distance,
        }),
        _ => None,
    })
}
