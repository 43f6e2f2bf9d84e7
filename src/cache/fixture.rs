// Cache fixtures - line-oriented JSON records of CacheEntry
//
// One object per line: {"chord":..,"frequency":..,"bpm":..,"timestamp":..}
// Blank lines are ignored on read.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::CacheEntry;
use crate::error::CacheError;

/// Write entries in order, one JSON record per line
pub fn write_entries<W: Write>(mut writer: W, entries: &[CacheEntry]) -> Result<(), CacheError> {
    for entry in entries {
        let line = serde_json::to_string(entry).map_err(|e| CacheError::FixtureIo {
            reason: e.to_string(),
        })?;
        writeln!(writer, "{}", line)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read records in file order
///
/// # Errors
/// [`CacheError::FixtureParse`] with the 1-based line number of the first
/// malformed record, [`CacheError::FixtureIo`] if reading fails.
pub fn read_entries<R: Read>(reader: R) -> Result<Vec<CacheEntry>, CacheError> {
    let mut entries = Vec::new();
    for (index, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let entry = serde_json::from_str(trimmed).map_err(|e| CacheError::FixtureParse {
            line: index + 1,
            reason: e.to_string(),
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

pub fn save_entries<P: AsRef<Path>>(path: P, entries: &[CacheEntry]) -> Result<(), CacheError> {
    let file = File::create(path)?;
    write_entries(BufWriter::new(file), entries)
}

pub fn load_entries<P: AsRef<Path>>(path: P) -> Result<Vec<CacheEntry>, CacheError> {
    let file = File::open(path)?;
    read_entries(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_preserves_order() {
        let entries = vec![
            CacheEntry::new("C", 261.63, 120.0, 1000.0),
            CacheEntry::new("G", 392.0, 0.0, 1000.5),
            CacheEntry::new("Am", 440.0, 118.5, 1001.25),
        ];
        let mut buffer = Vec::new();
        write_entries(&mut buffer, &entries).unwrap();

        let text = String::from_utf8(buffer.clone()).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with(r#"{"chord":"C","frequency":261.63,"bpm":120.0,"timestamp":1000.0}"#));

        assert_eq!(read_entries(buffer.as_slice()).unwrap(), entries);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let text = "\n{\"chord\":\"C\",\"frequency\":0,\"bpm\":0,\"timestamp\":1}\n\n";
        let entries = read_entries(text.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].chord, "C");
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let text = "{\"chord\":\"C\",\"frequency\":0,\"bpm\":0,\"timestamp\":1}\nnot json\n";
        match read_entries(text.as_bytes()) {
            Err(CacheError::FixtureParse { line, .. }) => assert_eq!(line, 2),
            other => panic!("Expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_entries("does/not/exist.jsonl"),
            Err(CacheError::FixtureIo { .. })
        ));
    }
}
