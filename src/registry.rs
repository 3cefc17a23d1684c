// =============================================================================
// registry.rs — THE FINGERPRINT DATABASE
// =============================================================================
//
// A CSV file with four columns and no header:
//
//   name, cname pattern, error signature, http-only flag
//
//   github,github\.io,There isn't a GitHub Pages site here,true
//   heroku,herokuapp\.com,no-such-app\.html,false
//
// It is loaded exactly once, before the first domain is scanned, and never
// touched again. Both patterns are compiled here. A row whose regex will not
// compile is skipped with a warning at load time, so a typo in row 40 costs
// you one provider instead of quietly never matching anything.
// =============================================================================

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::errors::{EngineError, IoResultExt, Result};
use crate::models::ProviderRecord;

/// Ordered, read-only collection of provider fingerprints.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    records: Vec<ProviderRecord>,
}

impl ProviderRegistry {
    /// Load the registry from a fingerprints file. Failing to open the file
    /// is fatal; malformed rows are not.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let file = File::open(path).with_path(&display, "open fingerprints file")?;
        Self::from_reader(file, &display)
    }

    /// Parse fingerprints from any reader. `source` only feeds log lines.
    pub fn from_reader<R: Read>(reader: R, source: &str) -> Result<Self> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);

        let mut records = Vec::new();
        let mut skipped = 0usize;

        for row in csv_reader.records() {
            let row = match row {
                Ok(row) => row,
                Err(e) if e.is_io_error() => return Err(EngineError::csv(source, e)),
                Err(e) => {
                    skipped += 1;
                    warn!(source = source, error = %e, "Skipping unreadable fingerprint row");
                    continue;
                }
            };

            let line = row.position().map(|p| p.line()).unwrap_or(0);
            match parse_row(&row) {
                Ok(record) => {
                    if records
                        .iter()
                        .any(|r: &ProviderRecord| r.name.eq_ignore_ascii_case(&record.name))
                    {
                        debug!(
                            provider = record.name.as_str(),
                            line = line,
                            "Provider appears more than once; each row is checked in order"
                        );
                    }
                    records.push(record);
                }
                Err(reason) => {
                    skipped += 1;
                    warn!(
                        source = source,
                        line = line,
                        reason = reason.as_str(),
                        "Skipping invalid fingerprint row"
                    );
                }
            }
        }

        info!(
            source = source,
            providers = records.len(),
            skipped = skipped,
            "Fingerprint database loaded"
        );

        Ok(Self { records })
    }

    pub fn records(&self) -> &[ProviderRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn parse_row(row: &StringRecord) -> std::result::Result<ProviderRecord, String> {
    if row.len() < 4 {
        return Err(format!("expected 4 fields, found {}", row.len()));
    }

    let name = &row[0];
    if name.is_empty() {
        return Err("empty provider name".to_string());
    }

    let cname_pattern = Regex::new(&row[1])
        .map_err(|e| format!("invalid CNAME pattern for {}: {}", name, e))?;
    let error_signature = Regex::new(&row[2])
        .map_err(|e| format!("invalid error signature for {}: {}", name, e))?;

    Ok(ProviderRecord {
        name: name.to_string(),
        cname_pattern,
        error_signature,
        use_http: row[3].eq_ignore_ascii_case("true"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
github,github\\.io,There isn't a GitHub Pages site here,true
heroku,herokuapp\\.com,no-such-app\\.html,false
";

    #[test]
    fn test_loads_rows_in_order() {
        let registry = ProviderRegistry::from_reader(SAMPLE.as_bytes(), "inline").unwrap();
        let names: Vec<&str> = registry.records().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["github", "heroku"]);
        assert!(registry.records()[0].use_http);
        assert!(!registry.records()[1].use_http);
    }

    #[test]
    fn test_malformed_pattern_is_skipped_not_fatal() {
        let data = "broken,(unclosed,whatever,true\ngithub,github\\.io,nope,true\n";
        let registry = ProviderRegistry::from_reader(data.as_bytes(), "inline").unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.records()[0].name, "github");
    }

    #[test]
    fn test_short_rows_comments_and_blank_lines_are_ignored() {
        let data = "# provider,cname,signature,http\n\nshort,row\n  surge , surge\\.sh , project not found , TRUE \n";
        let registry = ProviderRegistry::from_reader(data.as_bytes(), "inline").unwrap();
        assert_eq!(registry.len(), 1);
        let record = &registry.records()[0];
        assert_eq!(record.name, "surge");
        assert!(record.use_http);
        assert!(record.cname_pattern.is_match("foo.surge.sh"));
    }

    #[test]
    fn test_quoted_fields_may_contain_commas() {
        let data = "fastly,fastly\\.net,\"Fastly error: unknown domain, sorry\",false\n";
        let registry = ProviderRegistry::from_reader(data.as_bytes(), "inline").unwrap();
        assert!(registry.records()[0]
            .error_signature
            .is_match("Fastly error: unknown domain, sorry"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        file.flush().unwrap();
        let registry = ProviderRegistry::load(file.path()).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let err = ProviderRegistry::load("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }
}
