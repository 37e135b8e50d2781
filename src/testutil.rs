//! Shared fixtures for unit tests: tiny xlsx and ods writers and an in-memory object store.

use anyhow::Result;
use async_trait::async_trait;
use std::{
    collections::BTreeMap,
    fs,
    io::{Cursor, Write},
    path::Path,
    sync::Mutex,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use crate::upload::ObjectStore;

pub fn init_test_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sheetlake=debug")),
        )
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// A cell as written into a fixture worksheet.
#[derive(Debug, Clone)]
pub enum Fx {
    Str(&'static str),
    Num(f64),
    Bool(bool),
    /// Excel serial date, rendered with the built-in `m/d/yyyy` format.
    Date(f64),
    Blank,
}

pub type FixtureSheet = (&'static str, Vec<Vec<Fx>>);

fn col_letters(mut idx: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (idx % 26) as u8);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn sheet_xml(rows: &[Vec<Fx>]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        xml.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, cell) in row.iter().enumerate() {
            let cref = format!("{}{}", col_letters(c), r + 1);
            match cell {
                Fx::Str(s) => xml.push_str(&format!(
                    r#"<c r="{cref}" t="inlineStr"><is><t>{}</t></is></c>"#,
                    escape(s)
                )),
                Fx::Num(n) => xml.push_str(&format!(r#"<c r="{cref}"><v>{n}</v></c>"#)),
                Fx::Bool(b) => xml.push_str(&format!(
                    r#"<c r="{cref}" t="b"><v>{}</v></c>"#,
                    u8::from(*b)
                )),
                Fx::Date(serial) => {
                    xml.push_str(&format!(r#"<c r="{cref}" s="1"><v>{serial}</v></c>"#))
                }
                Fx::Blank => {}
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

/// Build a minimal but valid xlsx workbook in memory.
pub fn xlsx_bytes(sheets: &[FixtureSheet]) -> Vec<u8> {
    let mut sheet_entries = String::new();
    let mut rels = String::new();
    let mut overrides = String::new();
    for (i, (name, _)) in sheets.iter().enumerate() {
        let n = i + 1;
        sheet_entries.push_str(&format!(
            r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
            escape(name)
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{n}.xml"/>"#
        ));
        overrides.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
    }
    let styles_rid = sheets.len() + 1;
    rels.push_str(&format!(
        r#"<Relationship Id="rId{styles_rid}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#
    ));

    let content_types = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>{overrides}</Types>"#
    );
    let root_rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;
    let workbook = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>{sheet_entries}</sheets></workbook>"#
    );
    let workbook_rels = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
    );
    let styles = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="14" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/></cellXfs></styleSheet>"#;

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut put = |name: &str, body: &str| {
            zip.start_file(name, options.clone()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        };
        put("[Content_Types].xml", &content_types);
        put("_rels/.rels", root_rels);
        put("xl/workbook.xml", &workbook);
        put("xl/_rels/workbook.xml.rels", &workbook_rels);
        put("xl/styles.xml", styles);
        for (i, (_, rows)) in sheets.iter().enumerate() {
            put(&format!("xl/worksheets/sheet{}.xml", i + 1), &sheet_xml(rows));
        }
        zip.finish().unwrap();
    }
    buf
}

pub fn write_xlsx(path: &Path, sheets: &[FixtureSheet]) -> Result<()> {
    fs::write(path, xlsx_bytes(sheets))?;
    Ok(())
}

fn ods_table(name: &str, rows: &[Vec<Fx>]) -> String {
    let mut xml = format!(r#"<table:table table:name="{}">"#, escape(name));
    for row in rows {
        xml.push_str("<table:table-row>");
        for cell in row {
            match cell {
                Fx::Str(s) => xml.push_str(&format!(
                    r#"<table:table-cell office:value-type="string"><text:p>{}</text:p></table:table-cell>"#,
                    escape(s)
                )),
                Fx::Num(n) => xml.push_str(&format!(
                    r#"<table:table-cell office:value-type="float" office:value="{n}"><text:p>{n}</text:p></table:table-cell>"#
                )),
                Fx::Bool(b) => xml.push_str(&format!(
                    r#"<table:table-cell office:value-type="boolean" office:boolean-value="{b}"><text:p>{b}</text:p></table:table-cell>"#
                )),
                Fx::Date(_) => panic!("serial dates are only supported in xlsx fixtures"),
                Fx::Blank => xml.push_str("<table:table-cell/>"),
            }
        }
        xml.push_str("</table:table-row>");
    }
    xml.push_str("</table:table>");
    xml
}

/// Build a minimal OpenDocument spreadsheet in memory.
pub fn ods_bytes(sheets: &[FixtureSheet]) -> Vec<u8> {
    let tables: String = sheets
        .iter()
        .map(|(name, rows)| ods_table(name, rows))
        .collect();
    let content = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0" office:version="1.2"><office:body><office:spreadsheet>{tables}</office:spreadsheet></office:body></office:document-content>"#
    );
    let manifest = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0" manifest:version="1.2"><manifest:file-entry manifest:full-path="/" manifest:media-type="application/vnd.oasis.opendocument.spreadsheet"/><manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/></manifest:manifest>"#;

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut put = |name: &str, body: &str| {
            zip.start_file(name, options.clone()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        };
        // must be the first entry, uncompressed
        put("mimetype", "application/vnd.oasis.opendocument.spreadsheet");
        put("META-INF/manifest.xml", manifest);
        put("content.xml", &content);
        zip.finish().unwrap();
    }
    buf
}

pub fn write_ods(path: &Path, sheets: &[FixtureSheet]) -> Result<()> {
    fs::write(path, ods_bytes(sheets))?;
    Ok(())
}

/// The registrations sheet used across tests: mixed text, integers, floats, dates, bools.
pub fn registrations() -> Vec<FixtureSheet> {
    vec![(
        "Registrations",
        vec![
            vec![
                Fx::Str("Registration"),
                Fx::Str("Count"),
                Fx::Str("Weight"),
                Fx::Str("Registered"),
                Fx::Str("Commercial"),
            ],
            vec![
                Fx::Str("FA3XYZ"),
                Fx::Num(3.0),
                Fx::Num(1.25),
                Fx::Date(44832.0),
                Fx::Bool(true),
            ],
            vec![
                Fx::Str("FA7QRS"),
                Fx::Num(12.0),
                Fx::Blank,
                Fx::Date(44833.5),
                Fx::Bool(false),
            ],
            vec![
                Fx::Str("FA9ABC"),
                Fx::Blank,
                Fx::Num(7.0),
                Fx::Blank,
                Fx::Bool(true),
            ],
        ],
    )]
}

/// Object store that keeps uploads in memory, keyed by `(bucket, key)`.
#[derive(Default)]
pub struct MemoryStore {
    pub objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn keys(&self) -> Vec<(String, String)> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn insert(&self, bucket: &str, key: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data.to_vec());
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .contains_key(&(bucket.to_string(), key.to_string())))
    }

    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<u64> {
        let data = tokio::fs::read(path).await?;
        let len = data.len() as u64;
        self.insert(bucket, key, &data);
        Ok(len)
    }
}
