use anyhow::{anyhow, bail, Context, Result};
use calamine::{open_workbook_auto, Data, DataType, Range, Reader};
use chrono::NaiveDateTime;
use std::{
    collections::{HashMap, HashSet},
    convert::Infallible,
    fmt,
    path::Path,
    str::FromStr,
};
use tracing::{debug, instrument};

/// One spreadsheet cell, reduced to the shapes the converter cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
    /// `#N/A`, `#DIV/0!` and friends
    Error(String),
}

impl Cell {
    pub fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::Bool(b) => Cell::Bool(*b),
            Data::Int(i) => Cell::Int(*i),
            Data::Float(f) => Cell::Float(*f),
            Data::String(s) if s.is_empty() => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::DateTime(_) | Data::DateTimeIso(_) => match data.as_datetime() {
                Some(dt) => Cell::DateTime(dt),
                None => Cell::Text(data.to_string()),
            },
            Data::Error(e) => Cell::Error(e.to_string()),
            other => Cell::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Empty | Cell::Error(_))
    }

    /// Text form of the cell, `None` for nulls. Integral floats print without `.0`.
    pub fn render(&self) -> Option<String> {
        match self {
            Cell::Empty | Cell::Error(_) => None,
            Cell::Bool(b) => Some(b.to_string()),
            Cell::Int(i) => Some(i.to_string()),
            Cell::Float(f) if is_integral(*f) => Some((*f as i64).to_string()),
            Cell::Float(f) => Some(f.to_string()),
            Cell::Text(s) => Some(s.clone()),
            Cell::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }
}

/// True when `f` holds a whole number that survives the trip through `i64`.
pub fn is_integral(f: f64) -> bool {
    // 2^53: beyond this f64 no longer represents every integer
    f.is_finite() && f.fract() == 0.0 && f.abs() <= 9_007_199_254_740_992.0
}

/// Which worksheet of a workbook to convert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SheetSelector {
    #[default]
    First,
    Index(usize),
    Name(String),
}

impl FromStr for SheetSelector {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.parse::<usize>() {
            Ok(idx) => SheetSelector::Index(idx),
            Err(_) if s.is_empty() => SheetSelector::First,
            Err(_) => SheetSelector::Name(s.to_string()),
        })
    }
}

impl fmt::Display for SheetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetSelector::First => write!(f, "<first>"),
            SheetSelector::Index(i) => write!(f, "#{}", i),
            SheetSelector::Name(n) => write!(f, "{}", n),
        }
    }
}

/// Header row plus data rows of a single worksheet.
#[derive(Debug, Clone)]
pub struct SheetTable {
    pub sheet_name: String,
    pub headers: Vec<String>,
    /// Every row is exactly `headers.len()` cells wide.
    pub rows: Vec<Vec<Cell>>,
}

impl SheetTable {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// Open `path` (xlsx, xlsm, xlsb, xls or ods) and read the selected worksheet.
/// The first row of the used range is taken as the header row.
#[instrument(level = "debug", skip(path), fields(path = %path.display()))]
pub fn read_sheet(path: &Path, selector: &SheetSelector) -> Result<SheetTable> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("opening workbook {}", path.display()))?;
    let names: Vec<String> = workbook.sheet_names().to_vec();

    let sheet_name = match selector {
        SheetSelector::First => names
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("workbook {} has no worksheets", path.display()))?,
        // a sheet literally named "2022" wins over position 2022
        SheetSelector::Index(idx) => match names.iter().find(|n| **n == idx.to_string()) {
            Some(name) => name.clone(),
            None => names.get(*idx).cloned().ok_or_else(|| {
                anyhow!(
                    "workbook {} has {} worksheet(s), no sheet at index {}",
                    path.display(),
                    names.len(),
                    idx
                )
            })?,
        },
        SheetSelector::Name(name) => {
            if !names.iter().any(|n| n == name) {
                bail!(
                    "sheet {:?} not found in {}; available: {}",
                    name,
                    path.display(),
                    names.join(", ")
                );
            }
            name.clone()
        }
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("reading sheet {:?} of {}", sheet_name, path.display()))?;
    debug!(sheet = %sheet_name, size = ?range.get_size(), "loaded worksheet range");

    Ok(table_from_range(sheet_name, &range))
}

pub fn table_from_range(sheet_name: String, range: &Range<Data>) -> SheetTable {
    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return SheetTable {
            sheet_name,
            headers: Vec::new(),
            rows: Vec::new(),
        };
    };

    let headers = normalize_headers(header_row.iter().map(|d| Cell::from_data(d).render()));
    let width = headers.len();
    let rows = rows
        .map(|row| {
            let mut cells: Vec<Cell> = row.iter().map(Cell::from_data).collect();
            cells.resize(width, Cell::Empty);
            cells
        })
        .collect();

    SheetTable {
        sheet_name,
        headers,
        rows,
    }
}

/// Turn raw header cells into unique column names.
///
/// Blank headers become `Unnamed: <index>`; repeats of a name get `.1`, `.2`, …
/// appended in order of appearance, skipping any suffix already taken.
pub fn normalize_headers<I>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    let mut used: HashSet<String> = HashSet::new();
    let mut counters: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::new();

    for (idx, header) in raw.into_iter().enumerate() {
        let base = header
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| format!("Unnamed: {}", idx));

        if used.insert(base.clone()) {
            out.push(base);
            continue;
        }
        let n = counters.entry(base.clone()).or_insert(0);
        loop {
            *n += 1;
            let candidate = format!("{}.{}", base, n);
            if used.insert(candidate.clone()) {
                out.push(candidate);
                break;
            }
        }
    }
    out
}
