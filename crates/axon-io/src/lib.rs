//! # Axon IO
//!
//! The flat binary time-series format and the paired-file channel
//! export/import built on it.
//!
//! ## Format
//!
//! A serialized series is nothing but consecutive 8-byte little-endian
//! IEEE-754 doubles: no header, no length prefix, no delimiter, no
//! compression. A buffer whose length is not a multiple of 8 is malformed.
//!
//! Exporting a channel always writes TWO files into the target directory:
//! the channel's values (`v.bin` / `gk.bin` / `gna.bin`) and the shared
//! time axis (`t.bin`), both under the same encoding. Import reads the
//! pair back and insists the sample counts match.

use axon_core::{AxonError, Result};
use axon_sim::SimulationResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File holding the shared time axis
pub const TIME_FILE_NAME: &str = "t.bin";

// ============================================================================
// CODEC
// ============================================================================

/// Encode a series as consecutive little-endian f64 bytes
pub fn encode(values: &[f64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 8);
    for value in values {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf
}

/// Decode a buffer of consecutive little-endian f64 bytes
///
/// Bit-exact inverse of [`encode`] for any finite-length series. A buffer
/// length that is not a multiple of 8 is a format error, not a truncation.
pub fn decode(bytes: &[u8]) -> Result<Vec<f64>> {
    let chunks = bytes.chunks_exact(8);
    if !chunks.remainder().is_empty() {
        return Err(AxonError::Format(format!(
            "buffer length {} is not a multiple of 8",
            bytes.len()
        )));
    }
    Ok(chunks
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect())
}

// ============================================================================
// CHANNELS
// ============================================================================

/// Exportable observable of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Membrane potential V(t)
    Voltage,
    /// K+ conductance `g_k * n^4`
    KConductance,
    /// Na+ conductance `g_na * m^3 * h`
    NaConductance,
}

impl Channel {
    /// File the channel's values live in (the time axis shares `t.bin`)
    pub fn value_file_name(&self) -> &'static str {
        match self {
            Channel::Voltage => "v.bin",
            Channel::KConductance => "gk.bin",
            Channel::NaConductance => "gna.bin",
        }
    }

    /// Extract the channel's series from a result
    pub fn observable(&self, result: &SimulationResult) -> Vec<f64> {
        match self {
            Channel::Voltage => result.v.clone(),
            Channel::KConductance => result.g_k_series(),
            Channel::NaConductance => result.g_na_series(),
        }
    }
}

impl FromStr for Channel {
    type Err = AxonError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "V" | "v" => Ok(Channel::Voltage),
            "gK" | "gk" => Ok(Channel::KConductance),
            "gNa" | "gna" => Ok(Channel::NaConductance),
            other => Err(AxonError::InvalidParameters(format!(
                "unknown channel: {other}"
            ))),
        }
    }
}

// ============================================================================
// EXPORT / IMPORT
// ============================================================================

fn channel_paths(dir: &Path, channel: Channel) -> (PathBuf, PathBuf) {
    (
        dir.join(channel.value_file_name()),
        dir.join(TIME_FILE_NAME),
    )
}

/// Write one channel and the shared time axis into `dir`
///
/// File handles are scoped inside `fs::write` and released on every path,
/// including early error returns.
pub fn export_channel(
    dir: impl AsRef<Path>,
    channel: Channel,
    result: &SimulationResult,
) -> Result<()> {
    let (value_path, time_path) = channel_paths(dir.as_ref(), channel);
    let values = channel.observable(result);

    log::debug!(
        "exporting {} samples to {} + {}",
        values.len(),
        value_path.display(),
        time_path.display()
    );

    fs::write(&value_path, encode(&values))?;
    fs::write(&time_path, encode(&result.time))?;
    Ok(())
}

/// Read `(times, values)` for one channel back from `dir`
///
/// The two files must decode cleanly and carry the same number of samples.
pub fn import_channel(dir: impl AsRef<Path>, channel: Channel) -> Result<(Vec<f64>, Vec<f64>)> {
    let (value_path, time_path) = channel_paths(dir.as_ref(), channel);

    let times = decode(&fs::read(&time_path)?)?;
    let values = decode(&fs::read(&value_path)?)?;

    if times.len() != values.len() {
        return Err(AxonError::Format(format!(
            "paired files disagree: {} time samples vs {} value samples",
            times.len(),
            values.len()
        )));
    }

    Ok((times, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_model::ModelParameters;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("axon-io-{tag}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn tiny_result() -> SimulationResult {
        // Hand-built two-sample result; export only needs the columns
        SimulationResult {
            time: vec![0.0, 0.01],
            v: vec![-65.0, -64.9],
            m: vec![0.05, 0.051],
            h: vec![0.5, 0.499],
            n: vec![0.4, 0.401],
            i_na: vec![-0.86, -0.9],
            i_k: vec![11.06, 11.1],
            i_l: vec![-3.18, -3.1],
            params: ModelParameters::default(),
        }
    }

    #[test]
    fn test_round_trip_is_bit_exact() {
        let series = vec![
            0.0,
            -0.0,
            1.0,
            -65.0,
            0.1 + 0.2,
            f64::MAX,
            f64::MIN_POSITIVE,
            5e-324, // smallest subnormal
            -1.7e308,
        ];
        let decoded = decode(&encode(&series)).unwrap();
        assert_eq!(decoded.len(), series.len());
        for (a, b) in series.iter().zip(&decoded) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_empty_series() {
        assert!(encode(&[]).is_empty());
        assert_eq!(decode(&[]).unwrap(), Vec::<f64>::new());
    }

    #[test]
    fn test_ragged_buffer_is_format_error() {
        let mut buf = encode(&[1.0, 2.0]);
        buf.pop();
        let err = decode(&buf).unwrap_err();
        assert!(matches!(err, AxonError::Format(_)));
    }

    #[test]
    fn test_export_import_pair() {
        let dir = scratch_dir("pair");
        let result = tiny_result();

        for channel in [Channel::Voltage, Channel::KConductance, Channel::NaConductance] {
            export_channel(&dir, channel, &result).unwrap();
            let (times, values) = import_channel(&dir, channel).unwrap();
            assert_eq!(times, result.time);
            assert_eq!(values, channel.observable(&result));
        }

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_mismatched_pair_is_format_error() {
        let dir = scratch_dir("mismatch");
        fs::write(dir.join(TIME_FILE_NAME), encode(&[0.0, 0.1, 0.2])).unwrap();
        fs::write(dir.join("v.bin"), encode(&[-65.0, -64.0])).unwrap();

        let err = import_channel(&dir, Channel::Voltage).unwrap_err();
        assert!(matches!(err, AxonError::Format(_)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = scratch_dir("missing");
        let err = import_channel(&dir, Channel::Voltage).unwrap_err();
        assert!(matches!(err, AxonError::Io(_)));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_channel_names() {
        assert_eq!("V".parse::<Channel>().unwrap(), Channel::Voltage);
        assert_eq!("gK".parse::<Channel>().unwrap(), Channel::KConductance);
        assert_eq!("gNa".parse::<Channel>().unwrap(), Channel::NaConductance);
        assert!("I_Na".parse::<Channel>().is_err());
    }
}
