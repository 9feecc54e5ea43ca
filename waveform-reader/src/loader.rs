//! Reads and writes the plain-text waveform file format.
//!
//! Line 1 holds the trigger (half-window) time in seconds, line 2 the number of
//! samples (or any header text, which is ignored), and every following non-blank
//! line one amplitude in volts, in acquisition order.
use crate::metadata::RunMetadata;
use sipm_common::{Real, SourceError, Waveform};
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, ErrorKind, Write},
    path::Path,
};

/// The decoded contents of one waveform file, before a time axis is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformFile {
    pub trigger_offset: Real,
    pub declared_points: Option<usize>,
    pub samples: Vec<Real>,
}

impl WaveformFile {
    /// Attaches a time axis to the samples.
    ///
    /// The sample interval is taken from the run metadata where possible,
    /// otherwise it is inferred from the trigger time, which sits at the
    /// centre of the acquisition window.
    pub fn into_waveform(self, metadata: Option<&RunMetadata>) -> Waveform {
        let sample_interval = metadata
            .and_then(RunMetadata::sample_interval)
            .unwrap_or_else(|| 2.0 * self.trigger_offset / self.samples.len() as Real);
        match self.declared_points {
            Some(points) => Waveform::with_point_count(
                self.samples,
                sample_interval,
                self.trigger_offset,
                points,
            ),
            None => Waveform::new(self.samples, sample_interval, self.trigger_offset),
        }
    }
}

/// Parses a waveform from any buffered reader.
/// # Parameters
/// - name: the file name, used in error messages.
/// - reader: the source of the file's text.
/// # Error Modes
/// - Emits [SourceError::Io] if the reader fails.
/// - Emits [SourceError::Parse] if the file has fewer than three lines.
/// - Emits [SourceError::Parse] if a line is not UTF-8 text or not a number.
pub fn parse_waveform<R: BufRead>(name: &str, reader: R) -> Result<WaveformFile, SourceError> {
    let mut lines = reader.lines().enumerate();
    let mut next_line = || -> Result<Option<(usize, String)>, SourceError> {
        lines
            .next()
            .map(|(index, line)| {
                line.map(|line| (index + 1, line))
                    .map_err(|source| match source.kind() {
                        ErrorKind::InvalidData => SourceError::Parse {
                            name: name.to_owned(),
                            line: index + 1,
                            message: source.to_string(),
                        },
                        _ => SourceError::Io {
                            name: name.to_owned(),
                            source,
                        },
                    })
            })
            .transpose()
    };
    let too_short = |line| SourceError::Parse {
        name: name.to_owned(),
        line,
        message: "File too short".to_owned(),
    };

    let (line_number, first) = next_line()?.ok_or_else(|| too_short(1))?;
    let trigger_offset = parse_real(name, line_number, &first)?;

    let (_, second) = next_line()?.ok_or_else(|| too_short(2))?;
    let declared_points = second.trim().parse::<usize>().ok();

    let mut samples = Vec::with_capacity(declared_points.unwrap_or_default());
    let mut last_line = 2;
    while let Some((line_number, line)) = next_line()? {
        last_line = line_number;
        if !line.trim().is_empty() {
            samples.push(parse_real(name, line_number, &line)?);
        }
    }
    if last_line < 3 {
        return Err(too_short(3));
    }

    Ok(WaveformFile {
        trigger_offset,
        declared_points,
        samples,
    })
}

fn parse_real(name: &str, line: usize, text: &str) -> Result<Real, SourceError> {
    text.trim()
        .parse::<Real>()
        .map_err(|e| SourceError::Parse {
            name: name.to_owned(),
            line,
            message: format!("{e}: '{}'", text.trim()),
        })
}

/// Loads a single waveform file from disk.
#[tracing::instrument(skip_all, level = "trace", fields(path = %path.display()))]
pub fn load_waveform_file(path: &Path) -> Result<WaveformFile, SourceError> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let file = File::open(path).map_err(|source| SourceError::Io {
        name: name.clone(),
        source,
    })?;
    parse_waveform(&name, BufReader::new(file))
}

/// Writes samples in the waveform file format, with the sample count on line 2.
pub fn write_waveform_file(
    path: &Path,
    trigger_offset: Real,
    samples: &[Real],
) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "{trigger_offset}")?;
    writeln!(writer, "{}", samples.len())?;
    for sample in samples {
        writeln!(writer, "{sample}")?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use sipm_common::MalformedWaveform;
    use std::io::Cursor;

    #[test]
    fn parse_with_count() {
        let text = "2.5e-06\n4\n0.001\n-0.002\n0.05\n0.0\n";
        let file = parse_waveform("a.txt", Cursor::new(text)).expect("should parse");
        assert_approx_eq!(file.trigger_offset, 2.5e-6);
        assert_eq!(file.declared_points, Some(4));
        assert_eq!(file.samples, vec![0.001, -0.002, 0.05, 0.0]);
    }

    #[test]
    fn parse_with_blank_header() {
        let text = "2.5e-06\n\n0.001\n\n0.002\n\n";
        let file = parse_waveform("a.txt", Cursor::new(text)).expect("should parse");
        assert_eq!(file.declared_points, None);
        assert_eq!(file.samples, vec![0.001, 0.002]);
    }

    #[test]
    fn too_short() {
        let result = parse_waveform("a.txt", Cursor::new("2.5e-06\n4\n"));
        assert!(matches!(result, Err(SourceError::Parse { line: 3, .. })));
    }

    #[test]
    fn bad_amplitude() {
        let result = parse_waveform("a.txt", Cursor::new("2.5e-06\n2\n0.1\nvolts\n"));
        assert!(matches!(result, Err(SourceError::Parse { line: 4, .. })));
    }

    #[test]
    fn invalid_utf8_is_a_parse_error() {
        let bytes: &[u8] = b"2.5e-06\n2\n0.1\n\xff\xfe\n";
        let result = parse_waveform("a.txt", Cursor::new(bytes));
        assert!(matches!(result, Err(SourceError::Parse { line: 4, .. })));
    }

    #[test]
    fn bad_trigger_time() {
        let result = parse_waveform("a.txt", Cursor::new("half\n2\n0.1\n0.2\n"));
        assert!(matches!(result, Err(SourceError::Parse { line: 1, .. })));
    }

    #[test]
    fn inferred_sample_interval() {
        let file = WaveformFile {
            trigger_offset: 2.0,
            declared_points: None,
            samples: vec![0.0; 8],
        };
        let waveform = file.into_waveform(None);
        assert_approx_eq!(waveform.sample_interval(), 0.5);
        assert_approx_eq!(waveform.time_at(4.0), 0.0);
    }

    #[test]
    fn declared_count_mismatch_is_malformed() {
        let text = "1e-06\n5\n0.1\n0.2\n0.3\n";
        let waveform = parse_waveform("a.txt", Cursor::new(text))
            .expect("should parse")
            .into_waveform(None);
        assert_eq!(
            waveform.validate(),
            Err(MalformedWaveform::SampleCountMismatch {
                declared: 5,
                actual: 3
            })
        );
    }

    #[test]
    fn write_then_load() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("wave_0.txt");
        let samples = vec![0.0, 0.012_345_678_9, -0.001, 1.0 / 3.0];
        write_waveform_file(&path, 2.5e-6, &samples).expect("file should be written");

        let file = load_waveform_file(&path).expect("file should load");
        assert_eq!(file.trigger_offset, 2.5e-6);
        assert_eq!(file.declared_points, Some(4));
        assert_eq!(file.samples, samples);
    }
}
