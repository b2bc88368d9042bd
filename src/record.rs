use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Field names of the pipe-delimited dump, in output order.
const FIELDS: [&str; 14] = [
    "id",
    "country_code",
    "continent_code",
    "region",
    "polygon_ids",
    "latitude",
    "longitude",
    "metro_code",
    "postal_code",
    "city",
    "conn_speed",
    "asn",
    "asn_ip_count",
    "timezone",
];

/// Geo and ASN metadata one provider holds for a set of prefixes.
///
/// Empty strings and zeros mean the provider had no value. `id` is unique
/// within the owning provider only.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: u32,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub continent_code: String,
    #[serde(default)]
    pub region: u16,
    #[serde(default)]
    pub polygon_ids: Vec<u32>,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub metro_code: u32,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub conn_speed: String,
    #[serde(default)]
    pub asn: Vec<u32>,
    /// Addresses announced by this ASN set, summed over every prefix.
    #[serde(default)]
    pub asn_ip_count: u64,
    #[serde(default)]
    pub timezone: String,
}

impl Record {
    #[inline]
    pub fn new(id: u32) -> Record {
        Record {
            id,
            ..Record::default()
        }
    }

    /// The dump header, `|` separated.
    pub fn header() -> String {
        FIELDS.join("|")
    }

    /// Write the record as one `|` separated row matching [`Record::header`].
    ///
    /// Polygon ids are joined with `,` and ASNs with `_`. No line terminator
    /// is written.
    pub fn write_dump<W: Write + ?Sized>(&self, wtr: &mut W) -> io::Result<()> {
        let mut int = itoa::Buffer::new();
        let mut float = ryu::Buffer::new();

        wtr.write_all(int.format(self.id).as_bytes())?;
        wtr.write_all(b"|")?;
        wtr.write_all(self.country_code.as_bytes())?;
        wtr.write_all(b"|")?;
        wtr.write_all(self.continent_code.as_bytes())?;
        wtr.write_all(b"|")?;
        wtr.write_all(int.format(self.region).as_bytes())?;
        wtr.write_all(b"|")?;
        write_joined(wtr, &self.polygon_ids, b",")?;
        wtr.write_all(b"|")?;
        wtr.write_all(float.format(self.latitude).as_bytes())?;
        wtr.write_all(b"|")?;
        wtr.write_all(float.format(self.longitude).as_bytes())?;
        wtr.write_all(b"|")?;
        wtr.write_all(int.format(self.metro_code).as_bytes())?;
        wtr.write_all(b"|")?;
        wtr.write_all(self.postal_code.as_bytes())?;
        wtr.write_all(b"|")?;
        wtr.write_all(self.city.as_bytes())?;
        wtr.write_all(b"|")?;
        wtr.write_all(self.conn_speed.as_bytes())?;
        wtr.write_all(b"|")?;
        write_joined(wtr, &self.asn, b"_")?;
        wtr.write_all(b"|")?;
        wtr.write_all(int.format(self.asn_ip_count).as_bytes())?;
        wtr.write_all(b"|")?;
        wtr.write_all(self.timezone.as_bytes())
    }

    /// The dump row as a string.
    pub fn dump(&self) -> String {
        let mut buf = Vec::with_capacity(64);
        // Writing to a Vec cannot fail.
        let _ = self.write_dump(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

fn write_joined<W: Write + ?Sized>(wtr: &mut W, values: &[u32], sep: &[u8]) -> io::Result<()> {
    let mut buf = itoa::Buffer::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            wtr.write_all(sep)?;
        }
        wtr.write_all(buf.format(*value).as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record {
            id: 17,
            country_code: "US".into(),
            continent_code: "NA".into(),
            region: 44,
            polygon_ids: vec![3, 9],
            latitude: 37.751,
            longitude: -97.822,
            city: "Wichita".into(),
            asn: vec![701, 1239],
            asn_ip_count: 512,
            timezone: "America/Chicago".into(),
            ..Record::default()
        }
    }

    #[test]
    fn dump_matches_header_layout() {
        let dump = sample().dump();
        assert_eq!(
            dump,
            "17|US|NA|44|3,9|37.751|-97.822|0||Wichita||701_1239|512|America/Chicago"
        );
        assert_eq!(dump.split('|').count(), Record::header().split('|').count());
    }

    #[test]
    fn empty_record_dumps_zeros() {
        assert_eq!(Record::new(1).dump(), "1|||0||0.0|0.0|0|||||0|");
    }

    #[test]
    fn json_reads_partial_input() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(json.contains("\"asn\":[701,1239]"));

        let partial: Record = serde_json::from_str(r#"{"id":5,"asn":[13335]}"#).unwrap();
        assert_eq!(partial.id, 5);
        assert_eq!(partial.asn, vec![13335]);
        assert!(partial.city.is_empty());
    }
}
