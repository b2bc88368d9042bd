//! Loader for CAIDA RouteViews prefix-to-AS files.
//!
//! Each line is `address<TAB>masklen<TAB>origin`, where the origin is a
//! single ASN, a multi-origin set joined with `_` (`701_1239`), or an AS set
//! joined with `,`. Blank lines and `#` comments are skipped.
//!
//! Every distinct origin string becomes one record of the `pfx2as` provider,
//! numbered from 1 in order of first appearance, and every prefix is then
//! associated with its origin's record.

use std::io::Read;
use std::net::IpAddr;

use bstr::ByteSlice;
use ipmeta_index::{AddressFamily, Prefix};
use rustc_hash::FxHashMap as HashMap;

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::input::{for_each_line, FileOrStdin};
use crate::record::Record;

/// Name of the provider the loader fills.
pub const PROVIDER_NAME: &str = "pfx2as";

/// Counts from one load.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    /// Lines read, comments and blanks included.
    pub lines: u64,
    pub prefixes: usize,
    pub records: usize,
}

fn parse_error(line: u64, reason: impl Into<String>) -> Error {
    Error::Parse {
        line,
        reason: reason.into(),
    }
}

fn field<'a>(fields: &mut impl Iterator<Item = &'a [u8]>, name: &str, line: u64) -> Result<&'a str> {
    let raw = fields
        .next()
        .ok_or_else(|| parse_error(line, format!("missing {name}")))?;
    raw.to_str()
        .map_err(|_| parse_error(line, format!("{name} is not valid UTF-8")))
}

/// Split an origin such as `701_1239` or `701,1239` into ASNs.
pub fn parse_origin(origin: &str) -> Option<Vec<u32>> {
    origin
        .split(['_', ','])
        .map(|asn| asn.trim().parse().ok())
        .collect()
}

/// One non-comment line: its prefix and raw origin.
fn parse_line(line: &[u8], line_no: u64) -> Result<Option<(Prefix, &str)>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(b"#") {
        return Ok(None);
    }
    let mut fields = line.fields();
    let addr = field(&mut fields, "address", line_no)?;
    let len = field(&mut fields, "mask length", line_no)?;
    let origin = field(&mut fields, "origin", line_no)?;

    let addr: IpAddr = addr
        .parse()
        .map_err(|_| parse_error(line_no, format!("invalid address {addr:?}")))?;
    let len: u8 = len
        .parse()
        .map_err(|_| parse_error(line_no, format!("invalid mask length {len:?}")))?;
    let prefix = Prefix::from_ip(addr, len).map_err(|e| parse_error(line_no, e.to_string()))?;
    if parse_origin(origin).is_none() {
        return Err(parse_error(line_no, format!("invalid origin {origin:?}")));
    }
    Ok(Some((prefix, origin)))
}

/// Load pfx2as data from `reader` into `engine`, enabling the provider.
pub fn load<R: Read>(engine: &mut Engine, reader: R) -> Result<LoadSummary> {
    let mut summary = LoadSummary::default();
    let mut records: Vec<Record> = Vec::new();
    let mut by_origin: HashMap<String, u32> = HashMap::default();
    let mut entries: Vec<(Prefix, u32)> = Vec::new();

    for_each_line(reader, |line_no, line| {
        summary.lines = line_no;
        let Some((prefix, origin)) = parse_line(line, line_no)? else {
            return Ok(());
        };
        let id = match by_origin.get(origin) {
            Some(&id) => id,
            None => {
                let id = records.len() as u32 + 1;
                let mut record = Record::new(id);
                record.asn = parse_origin(origin).unwrap_or_default();
                records.push(record);
                by_origin.insert(origin.to_string(), id);
                id
            }
        };
        if prefix.family() == AddressFamily::V4 {
            records[id as usize - 1].asn_ip_count += prefix.host_count();
        }
        entries.push((prefix, id));
        Ok(())
    })?;

    let provider = engine.enable_provider_by_name(PROVIDER_NAME)?;
    summary.records = records.len();
    summary.prefixes = entries.len();

    let mut refs = Vec::with_capacity(records.len());
    for record in records {
        refs.push(engine.register_record(provider, record)?);
    }
    for (prefix, id) in &entries {
        engine.associate(prefix, refs[*id as usize - 1])?;
    }

    tracing::info!(
        lines = summary.lines,
        prefixes = summary.prefixes,
        records = summary.records,
        backend = %engine.backend(),
        "loaded pfx2as data"
    );
    Ok(summary)
}

/// Load pfx2as data from a file, or stdin for `-`.
pub fn load_from(engine: &mut Engine, source: &FileOrStdin) -> Result<LoadSummary> {
    tracing::debug!(source = %source, "reading pfx2as data");
    let reader = source.reader()?;
    load(engine, reader)
}
