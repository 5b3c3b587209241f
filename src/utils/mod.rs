pub mod locator;
pub mod qualified;

use chrono::NaiveDateTime;
use std::io::{self, BufRead, Write};

pub use qualified::QualifiedPath;

/// Content type tag carried by every generated media backup name.
pub const CONTENT_TYPE: &str = "media";
/// Timestamp layout used in generated backup names.
pub const DATE_FORMAT: &str = "%Y-%m-%d-%H%M%S";
/// Default in-memory limit for spooled temporary buffers (10 MiB).
pub const DEFAULT_TMP_FILE_MAX_SIZE: usize = 10 * 1024 * 1024;

/// Generates `[<servername>-]<datetime>-media.<extension>`.
pub fn filename_generate(extension: &str, servername: Option<&str>, at: NaiveDateTime) -> String {
    let datetime = at.format(DATE_FORMAT);
    match servername.filter(|s| !s.is_empty()) {
        Some(server) => format!("{}-{}-{}.{}", server, datetime, CONTENT_TYPE, extension),
        None => format!("{}-{}.{}", datetime, CONTENT_TYPE, extension),
    }
}

/// Archive extension before any encryption suffix: `tar` or `tar.gz`.
pub fn archive_extension(compress: bool) -> &'static str {
    if compress { "tar.gz" } else { "tar" }
}

/// Formats a byte count for log lines, e.g. `1.5 MiB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

/// Asks the user to confirm on stdin. Anything starting with "n" declines.
pub fn ask_confirmation(question: &str) -> io::Result<bool> {
    print!("{} [Y/n] ", question);
    io::stdout().flush()?;
    read_confirmation(&mut io::stdin().lock())
}

/// Reads one answer line. A closed input is an error, never a yes.
fn read_confirmation(input: &mut impl BufRead) -> io::Result<bool> {
    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "no answer: input closed before confirmation",
        ));
    }
    Ok(confirmation_accepted(&answer))
}

fn confirmation_accepted(answer: &str) -> bool {
    !answer.trim().to_lowercase().starts_with('n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(14, 5, 7))
            .expect("valid timestamp")
    }

    #[test]
    fn test_filename_generate_with_and_without_server() {
        assert_eq!(
            filename_generate("tar.gz", Some("web01"), at()),
            "web01-2024-03-09-140507-media.tar.gz"
        );
        assert_eq!(filename_generate("tar", None, at()), "2024-03-09-140507-media.tar");
        assert_eq!(filename_generate("tar", Some(""), at()), "2024-03-09-140507-media.tar");
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(1023), "1023 B");
        assert_eq!(human_size(1536), "1.5 KiB");
        assert_eq!(human_size(10 * 1024 * 1024), "10.0 MiB");
    }

    #[test]
    fn test_confirmation_answers() {
        assert!(confirmation_accepted("\n"));
        assert!(confirmation_accepted("y\n"));
        assert!(confirmation_accepted("Yes"));
        assert!(!confirmation_accepted("n\n"));
        assert!(!confirmation_accepted("  No "));
    }

    #[test]
    fn test_closed_input_does_not_confirm() -> anyhow::Result<()> {
        let err = read_confirmation(&mut &b""[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        assert!(read_confirmation(&mut &b"\n"[..])?);
        assert!(!read_confirmation(&mut &b"n\nignored\n"[..])?);
        Ok(())
    }
}
