use camino::Utf8PathBuf;
use ripline::{
    line_buffer::{LineBufferBuilder, LineBufferReader},
    lines::LineIter,
};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};

use crate::error::{Error, Result};

/// A source that can be either a file or stdin.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub enum FileOrStdin {
    /// Input from a file.
    File(Utf8PathBuf),
    /// Input from stdin.
    #[default]
    Stdin,
}

impl fmt::Display for FileOrStdin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOrStdin::File(path) => write!(f, "{}", path),
            FileOrStdin::Stdin => write!(f, "<stdin>"),
        }
    }
}

impl FileOrStdin {
    /// Create a new FileOrStdin from a path.
    ///
    /// If the path is "-", stdin is used.
    pub fn from_path(path: Utf8PathBuf) -> Self {
        if path.as_str() == "-" {
            FileOrStdin::Stdin
        } else {
            FileOrStdin::File(path)
        }
    }

    /// Open the input source as a reader.
    pub fn reader(&self) -> Result<InputReader> {
        match self {
            FileOrStdin::File(path) => {
                let file = File::open(path).map_err(|source| Error::Open {
                    path: path.clone(),
                    source,
                })?;
                Ok(InputReader::File(BufReader::new(file)))
            }
            FileOrStdin::Stdin => Ok(InputReader::Stdin(BufReader::new(io::stdin()))),
        }
    }
}

/// A reader for input from either a file or stdin.
pub enum InputReader {
    /// A reader for a file.
    File(BufReader<File>),
    /// A reader for stdin.
    Stdin(BufReader<io::Stdin>),
}

impl Read for InputReader {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            InputReader::File(ref mut rdr) => rdr.read(buf),
            InputReader::Stdin(ref mut rdr) => rdr.read(buf),
        }
    }
}

/// Call `f` with each line of `reader` and its 1-based line number.
///
/// Lines are passed without their terminator (`\n` or `\r\n`).
pub fn for_each_line<R, F>(reader: R, mut f: F) -> Result<()>
where
    R: Read,
    F: FnMut(u64, &[u8]) -> Result<()>,
{
    let mut line_buffer = LineBufferBuilder::new().capacity(65536).build();
    let mut lb_reader = LineBufferReader::new(reader, &mut line_buffer);
    let mut line_no = 0u64;

    while lb_reader.fill()? {
        for line in LineIter::new(b'\n', lb_reader.buffer()) {
            line_no += 1;
            let line = line.strip_suffix(b"\n").unwrap_or(line);
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            f(line_no, line)?;
        }
        lb_reader.consume_all();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dash_means_stdin() {
        assert_eq!(FileOrStdin::from_path("-".into()), FileOrStdin::Stdin);
        assert_eq!(FileOrStdin::Stdin.to_string(), "<stdin>");
        let file = FileOrStdin::from_path("routes.pfx2as".into());
        assert_eq!(file.to_string(), "routes.pfx2as");
    }

    #[test]
    fn lines_are_numbered_and_stripped() {
        let mut seen = Vec::new();
        for_each_line(&b"one\r\ntwo\n\nlast"[..], |n, line| {
            seen.push((n, line.to_vec()));
            Ok(())
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![
                (1, b"one".to_vec()),
                (2, b"two".to_vec()),
                (3, Vec::new()),
                (4, b"last".to_vec()),
            ]
        );
    }

    #[test]
    fn missing_file_names_the_path() {
        let missing = FileOrStdin::from_path("/nonexistent/ipmeta/input".into());
        let err = missing.reader().err().unwrap();
        assert!(matches!(err, Error::Open { .. }));
        assert!(err.to_string().contains("/nonexistent/ipmeta/input"));
    }
}
