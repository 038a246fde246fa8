//! Streaming / pasting / compressing regression harness
//!
//! Writes an input image once for every combination of streaming, pasting and
//! compression, then reads the output back and compares it with the input.
//! Errors raised by a write are outcomes here, judged against the expectation
//! given for that combination.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{info, warn};

use crate::image_pipeline::{
    MonitoredProducer, PasteTargetPolicy, PixelProducer, Region, StreamingWriter,
    ToleranceComparator, WriteRequest, WriterConfig, open_producer, open_sink, read_image,
};

/// Intensity difference compressed outputs are allowed to show.
pub const INTENSITY_TOLERANCE: f64 = 5.0;
pub const DEFAULT_PIECES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteCombination {
    pub stream: bool,
    pub paste: bool,
    pub compress: bool,
}

impl WriteCombination {
    /// The eight combinations in run order, `000` to `111`.
    pub fn all() -> [WriteCombination; 8] {
        std::array::from_fn(|i| WriteCombination {
            stream: i & 0b100 != 0,
            paste: i & 0b010 != 0,
            compress: i & 0b001 != 0,
        })
    }

    /// `"010"` style tag used in output file names.
    pub fn suffix(&self) -> String {
        format!(
            "{}{}{}",
            self.stream as u8, self.paste as u8, self.compress as u8
        )
    }
}

impl fmt::Display for WriteCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.stream as u8, self.paste as u8, self.compress as u8
        )
    }
}

/// What the write of one combination is expected to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpectedOutcome {
    /// A failing write passes; a successful one must produce the right image
    #[default]
    Unspecified,
    Success,
    Failure,
}

impl ExpectedOutcome {
    /// A flag whose leading integer is `1` expects a failure, anything else
    /// a success. Trailing characters are ignored, so `"1x"` reads as `1`.
    pub fn from_flag(flag: &str) -> Self {
        if leading_integer(flag) == 1 {
            ExpectedOutcome::Failure
        } else {
            ExpectedOutcome::Success
        }
    }

    /// One expectation per combination; missing flags stay unspecified.
    pub fn from_flags<S: AsRef<str>>(flags: &[S]) -> [ExpectedOutcome; 8] {
        std::array::from_fn(|i| {
            flags
                .get(i)
                .map_or(ExpectedOutcome::Unspecified, |f| Self::from_flag(f.as_ref()))
        })
    }
}

/// Optional sign and the digits after leading whitespace; 0 when there are none.
fn leading_integer(flag: &str) -> i64 {
    let flag = flag.trim_start();
    let (negative, rest) = match flag.as_bytes().first() {
        Some(b'-') => (true, &flag[1..]),
        Some(b'+') => (false, &flag[1..]),
        _ => (false, flag),
    };
    let value = rest
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| acc.saturating_mul(10).saturating_add(i64::from(d - b'0')));
    if negative { -value } else { value }
}

#[derive(Debug, Clone)]
pub struct RegressionCase {
    pub input: PathBuf,
    pub output_base: String,
    pub extension: String,
    pub pieces: usize,
}

impl RegressionCase {
    pub fn new(input: impl AsRef<Path>, output_base: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output_base: output_base.into(),
            extension: extension.into(),
            pieces: DEFAULT_PIECES,
        }
    }

    pub fn output_path(&self, combination: &WriteCombination) -> PathBuf {
        PathBuf::from(format!(
            "{}{}.{}",
            self.output_base,
            combination.suffix(),
            self.extension
        ))
    }
}

/// Middle third on the first two axes, one slice deep on the third.
pub fn paste_region(largest: &Region<3>) -> Region<3> {
    let mut paste = *largest;
    for d in 0..3 {
        paste.index[d] = largest.index[d] + (largest.size[d] / 3) as i64;
    }
    paste.size = [largest.size[0] / 3, largest.size[1] / 3, 1];
    paste
}

fn write_combination(
    case: &RegressionCase,
    combination: &WriteCombination,
    output: &Path,
) -> crate::image_pipeline::Result<Region<3>> {
    let producer = open_producer::<u8, 3>(&case.input)?;
    let largest = producer.largest_region();
    let mut monitor = MonitoredProducer::new(producer);

    let request = WriteRequest::builder(largest)
        .pieces(if combination.stream { case.pieces } else { 1 })
        .paste(combination.paste.then(|| paste_region(&largest)))
        .compress(combination.compress)
        .build();
    let config = WriterConfig::builder()
        .paste_target(PasteTargetPolicy::CreateZeroFilled)
        .build();

    let mut sink = open_sink::<3>(output)?;
    StreamingWriter::new(config).write::<u8, _, _, 3>(&request, &mut monitor, &mut sink)?;
    info!(updates = monitor.number_of_updates(), "Upstream updates");
    Ok(largest)
}

/// Runs one combination and reports whether it passed.
pub fn run_combination(
    case: &RegressionCase,
    combination: &WriteCombination,
    expected: ExpectedOutcome,
) -> anyhow::Result<bool> {
    println!("Writing Combination: {combination}");
    let output = case.output_path(combination);
    println!("Writing to File: {}", output.display());

    if output.exists() {
        std::fs::remove_file(&output)
            .with_context(|| format!("removing stale output {}", output.display()))?;
    }

    let largest = match write_combination(case, combination, &output) {
        Ok(largest) => largest,
        Err(e) => {
            if expected == ExpectedOutcome::Success {
                warn!(error = %e, "Unexpected write error");
                println!("UnExpected error caught: {e}");
                println!("TEST FAILED");
                return Ok(false);
            }
            info!(error = %e, "Expected write error");
            println!("Expected error caught: {e}");
            println!("TEST PASSED");
            return Ok(true);
        }
    };

    if expected == ExpectedOutcome::Failure {
        println!("Did not get expected error!");
        println!("TEST FAILED");
        return Ok(false);
    }

    let baseline = read_image::<u8, 3>(&case.input)
        .with_context(|| format!("reading input {}", case.input.display()))?;
    let written = read_image::<u8, 3>(&output)
        .with_context(|| format!("reading output {}", output.display()))?;
    let comparator = ToleranceComparator::new(INTENSITY_TOLERANCE, 0);

    let same = if combination.paste {
        let paste = paste_region(&largest);
        let test = written.extract(&paste)?;
        let valid = baseline.extract(&paste)?;
        let same = comparator.same_image(&test, &valid)?;
        if !same {
            println!("Paste regions of images differ");
        }
        same
    } else {
        let result = comparator.compare(&written, &baseline)?;
        let same = result.differing_pixel_count <= comparator.max_differing_pixels;
        if !same {
            println!("NumberOfPixelsWithDifference: {}", result.differing_pixel_count);
            println!("Images differ");
        }
        same
    };

    println!("{}", if same { "TEST PASSED" } else { "TEST FAILED" });
    Ok(same)
}

/// Runs every combination in order, stopping at the first failure.
pub fn run_all(case: &RegressionCase, expectations: &[ExpectedOutcome; 8]) -> anyhow::Result<bool> {
    for (combination, expected) in WriteCombination::all().iter().zip(expectations) {
        if !run_combination(case, combination, *expected)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combination_order() {
        let suffixes: Vec<String> = WriteCombination::all().iter().map(|c| c.suffix()).collect();
        assert_eq!(
            suffixes,
            vec!["000", "001", "010", "011", "100", "101", "110", "111"]
        );
    }

    #[test]
    fn test_expectation_flags() {
        let parsed = ExpectedOutcome::from_flags(&["0", "1", "abc"]);
        assert_eq!(parsed[0], ExpectedOutcome::Success);
        assert_eq!(parsed[1], ExpectedOutcome::Failure);
        assert_eq!(parsed[2], ExpectedOutcome::Success);
        assert_eq!(parsed[3], ExpectedOutcome::Unspecified);
        assert_eq!(parsed[7], ExpectedOutcome::Unspecified);
    }

    #[test]
    fn test_flags_read_leading_integer() {
        assert_eq!(ExpectedOutcome::from_flag("1x"), ExpectedOutcome::Failure);
        assert_eq!(ExpectedOutcome::from_flag(" +1"), ExpectedOutcome::Failure);
        assert_eq!(ExpectedOutcome::from_flag("10"), ExpectedOutcome::Success);
        assert_eq!(ExpectedOutcome::from_flag("-1"), ExpectedOutcome::Success);
        assert_eq!(ExpectedOutcome::from_flag("x1"), ExpectedOutcome::Success);
        assert_eq!(ExpectedOutcome::from_flag(""), ExpectedOutcome::Success);
    }

    #[test]
    fn test_paste_region_of_cube() {
        let paste = paste_region(&Region::from_size([30, 30, 30]));
        assert_eq!(paste, Region::new([10, 10, 10], [10, 10, 1]));
        let offset = paste_region(&Region::new([5, 0, -3], [9, 4, 2]));
        assert_eq!(offset, Region::new([8, 1, -3], [3, 1, 1]));
    }

    #[test]
    fn test_output_path() {
        let case = RegressionCase::new("in.vol", "/tmp/out", "vol");
        let combination = WriteCombination {
            stream: true,
            paste: false,
            compress: true,
        };
        assert_eq!(case.output_path(&combination), PathBuf::from("/tmp/out101.vol"));
    }
}
