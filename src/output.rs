use serde::Serialize;
use std::io::{self, Write};

use crate::engine::ResolvedMatch;
use crate::record::Record;

/// Header line for [`write_match`] rows, without a terminator.
pub fn header() -> String {
    format!("query|provider|ip_count|{}", Record::header())
}

/// Write one `query|provider|ip_count|<record>` row and a newline.
#[inline]
pub fn write_match<W: Write + ?Sized>(
    wtr: &mut W,
    query: &str,
    found: &ResolvedMatch<'_>,
) -> io::Result<()> {
    let mut count = itoa::Buffer::new();
    wtr.write_all(query.as_bytes())?;
    wtr.write_all(b"|")?;
    wtr.write_all(found.provider.as_bytes())?;
    wtr.write_all(b"|")?;
    wtr.write_all(count.format(found.ip_count).as_bytes())?;
    wtr.write_all(b"|")?;
    found.record.write_dump(wtr)?;
    wtr.write_all(b"\n")
}

#[derive(Serialize)]
struct JsonMatch<'a> {
    query: &'a str,
    #[serde(flatten)]
    found: &'a ResolvedMatch<'a>,
}

/// Write one match as a JSON object on its own line.
#[inline]
pub fn write_match_json<W: Write + ?Sized>(
    wtr: &mut W,
    query: &str,
    found: &ResolvedMatch<'_>,
) -> io::Result<()> {
    serde_json::to_writer(&mut *wtr, &JsonMatch { query, found })?;
    wtr.write_all(b"\n")
}
