use std::env;
use std::fs::{self, File};
use std::io::{self, BufWriter, Error, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};

#[cfg(unix)]
use crate::hid::gadget::GadgetKeyboard;
use crate::hid::{KeyboardDevice, LockKey};
use crate::stats::latency_statistics::LatencyStatistics;
use crate::stats::trial_sample::TrialSample;
use crate::ui::summary;

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Configuration file read from the working directory, if present.
pub const CONFIG_FILE: &str = "appsettings.json";

const DEFAULT_TRIAL_COUNT: u32 = 10;
const DEFAULT_TIMEOUT_NS: u64 = 25_000_000;
const DEFAULT_WARMUP_MS: u64 = 1000;
const DEFAULT_DEBOUNCE_MS: u64 = 200;
const DEFAULT_COOLDOWN_MS: u64 = 50;

#[derive(Debug, Deserialize, Serialize)]
pub struct BenchmarkingParameters {
    /// Number of press-and-observe trials per run.
    #[serde(
        rename = "TrialCount",
        default = "default_trial_count",
        deserialize_with = "validate_positive_u32"
    )]
    pub trial_count: u32,
    /// Poll deadline per trial. A trial whose LED change has not been
    /// observed after strictly more than this many nanoseconds is dropped.
    #[serde(
        rename = "TimeoutNanos",
        default = "default_timeout_ns",
        deserialize_with = "validate_positive_u64"
    )]
    pub timeout_ns: u64,
    /// Settle delay between the initial key release and the first trial.
    #[serde(rename = "WarmupMillis", default = "default_warmup_ms")]
    pub warmup_ms: u64,
    /// Pause after a successful trial.
    #[serde(rename = "DebounceMillis", default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Pause after a timed-out trial.
    #[serde(rename = "CooldownMillis", default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Lock key whose LED round-trip is measured.
    #[serde(rename = "TargetKey", default)]
    pub target_key: LockKey,
    /// Explicit HID gadget device node; discovered when absent.
    #[serde(rename = "DevicePath", default)]
    pub device_path: Option<PathBuf>,
    /// Raw tab-separated samples, overwritten each run.
    #[serde(rename = "MeasurementsFile", default = "default_measurements_file")]
    pub measurements_file: PathBuf,
    /// Supplementary per-trial CSV summary, overwritten each run.
    #[serde(rename = "SummaryFile", default = "default_summary_file")]
    pub summary_file: PathBuf,
}

fn default_trial_count() -> u32 {
    DEFAULT_TRIAL_COUNT
}

fn default_timeout_ns() -> u64 {
    DEFAULT_TIMEOUT_NS
}

fn default_warmup_ms() -> u64 {
    DEFAULT_WARMUP_MS
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_cooldown_ms() -> u64 {
    DEFAULT_COOLDOWN_MS
}

fn default_measurements_file() -> PathBuf {
    PathBuf::from("measurements.tsv")
}

fn default_summary_file() -> PathBuf {
    PathBuf::from("results.csv")
}

impl Default for BenchmarkingParameters {
    fn default() -> Self {
        Self {
            trial_count: DEFAULT_TRIAL_COUNT,
            timeout_ns: DEFAULT_TIMEOUT_NS,
            warmup_ms: DEFAULT_WARMUP_MS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            target_key: LockKey::default(),
            device_path: None,
            measurements_file: default_measurements_file(),
            summary_file: default_summary_file(),
        }
    }
}

fn validate_positive_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = u32::deserialize(deserializer)?;
    if value > 0 {
        Ok(value)
    } else {
        Err(serde::de::Error::custom("Value must be positive"))
    }
}

fn validate_positive_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = u64::deserialize(deserializer)?;
    if value > 0 {
        Ok(value)
    } else {
        Err(serde::de::Error::custom("Value must be positive"))
    }
}

/// Load parameters from `path`; a missing file means defaults, a malformed
/// one is fatal.
pub fn load_parameters(path: &Path) -> io::Result<BenchmarkingParameters> {
    match fs::read_to_string(path) {
        Ok(content) => {
            serde_json::from_str(&content).map_err(|e| Error::new(ErrorKind::InvalidData, e))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(BenchmarkingParameters::default()),
        Err(e) => Err(e),
    }
}

// ============================================================================
// LATENCY SAMPLER
// ============================================================================

/// Result of one full run.
pub struct RunOutcome {
    /// Samples of the successful trials, in trial order.
    pub samples: Vec<TrialSample>,
    /// Trials that hit the poll deadline; absent from `samples`.
    pub dropped: u32,
}

/// Drives N trials of "press the key, busy-poll the LED state until it flips
/// or the deadline passes, record the sample".
pub struct LatencySampler<'a, K: KeyboardDevice> {
    keyboard: K,
    params: &'a BenchmarkingParameters,
}

impl<'a, K: KeyboardDevice> LatencySampler<'a, K> {
    pub fn new(keyboard: K, params: &'a BenchmarkingParameters) -> Self {
        Self { keyboard, params }
    }

    /// Run all trials. The warm-up and the per-trial settle pauses block the
    /// whole process; nothing else runs concurrently during a measurement.
    pub async fn run(&mut self, progress: &ProgressBar) -> io::Result<RunOutcome> {
        // Start from a released key so leftover state from a previous run
        // cannot contaminate the first sample.
        self.keyboard.release(self.params.target_key)?;
        sleep(Duration::from_millis(self.params.warmup_ms)).await;

        let mut samples = Vec::with_capacity(self.params.trial_count as usize);
        let mut dropped = 0u32;
        for trial in 1..=self.params.trial_count {
            progress.set_message(format!("trial {}", trial));
            match self.run_trial()? {
                Some(sample) => {
                    samples.push(sample);
                    sleep(Duration::from_millis(self.params.debounce_ms)).await;
                }
                None => {
                    dropped += 1;
                    sleep(Duration::from_millis(self.params.cooldown_ms)).await;
                }
            }
            progress.inc(1);
        }
        Ok(RunOutcome { samples, dropped })
    }

    /// One trial. Returns `None` when the poll deadline passed without an
    /// observed LED change; the caller owns the settle pause either way.
    fn run_trial(&mut self) -> io::Result<Option<TrialSample>> {
        let key = self.params.target_key;
        let baseline = self.keyboard.led_on(key)?;
        self.keyboard.press(key)?;
        let start = Instant::now();
        let mut polls: u32 = 0;
        // Tight busy-wait, no sleep or yield: the poll cadence is part of
        // the measurement.
        loop {
            polls += 1;
            let elapsed_ns = start.elapsed().as_nanos() as u64;
            if self.keyboard.led_on(key)? != baseline {
                self.keyboard.release(key)?;
                return Ok(Some(TrialSample { elapsed_ns, polls }));
            }
            // Strictly greater than: a flip observed at the deadline exactly
            // still counts as a success on the next check above.
            if elapsed_ns > self.params.timeout_ns {
                self.keyboard.release(key)?;
                return Ok(None);
            }
        }
    }

    /// Hand the device back, e.g. to inspect a scripted stub after a run.
    pub fn into_keyboard(self) -> K {
        self.keyboard
    }
}

// ============================================================================
// RESULT FILES
// ============================================================================

/// Write the raw samples: one `<elapsed_ns>\t<polls>` line per successful
/// trial, no header, overwriting any previous file.
pub fn save_raw_measurements(path: &Path, samples: &[TrialSample]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for sample in samples {
        writeln!(writer, "{}\t{}", sample.elapsed_ns, sample.polls)?;
    }
    writer.flush()
}

#[derive(Serialize)]
struct TrialRow {
    trial: usize,
    elapsed_ns: u64,
    elapsed_ms: f64,
    polls: u32,
}

/// Write the supplementary per-trial CSV summary, overwriting any previous
/// file. The raw measurements file stays the authoritative output.
pub fn save_trial_summary(path: &Path, samples: &[TrialSample]) -> io::Result<()> {
    let mut writer =
        csv::Writer::from_path(path).map_err(|e| Error::new(ErrorKind::Other, e))?;
    for (index, sample) in samples.iter().enumerate() {
        writer
            .serialize(TrialRow {
                trial: index + 1,
                elapsed_ns: sample.elapsed_ns,
                elapsed_ms: sample.elapsed_ns as f64 / 1_000_000.0,
                polls: sample.polls,
            })
            .map_err(|e| Error::new(ErrorKind::Other, e))?;
    }
    writer.flush()
}

// ============================================================================
// BENCHMARK RUNNER
// ============================================================================

pub async fn run_benchmark() -> io::Result<()> {
    summary::banner("HID Keyboard LED Latency Benchmark");

    // System information block
    summary::section("System Information");
    println!("Working directory: {}", env::current_dir()?.display());
    let os = os_info::get();
    println!("OS: {} {}", os.os_type(), os.version());
    let system = sysinfo::System::new_all();
    if let Some(kernel) = sysinfo::System::kernel_version() {
        println!("Kernel: {}", kernel);
    }
    println!("Memory: {} MiB", system.total_memory() / (1024 * 1024));
    println!("Logical CPUs: {}", system.cpus().len());
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        let cpuid = raw_cpuid::CpuId::new();
        if let Some(brand) = cpuid.get_processor_brand_string() {
            println!("CPU: {}", brand.as_str().trim());
        }
    }
    println!();

    // Benchmark parameters block
    summary::section("Benchmark Parameters");
    let parameters = match load_parameters(Path::new(CONFIG_FILE)) {
        Ok(parameters) => parameters,
        Err(e) => {
            eprintln!("{} {}", "❌ Configuration Error:".bold().red(), e);
            return Err(e);
        }
    };
    println!("▸ Target key: {}", parameters.target_key);
    println!("▸ Trials: {}", parameters.trial_count);
    println!(
        "▸ Poll deadline: {:.1} ms",
        parameters.timeout_ns as f64 / 1_000_000.0
    );
    println!(
        "▸ Warm-up: {} ms, debounce: {} ms, cooldown: {} ms",
        parameters.warmup_ms, parameters.debounce_ms, parameters.cooldown_ms
    );
    println!(
        "▸ Raw measurements: {}",
        parameters.measurements_file.display()
    );
    println!("▸ Trial summary: {}", parameters.summary_file.display());
    println!();

    #[cfg(not(unix))]
    {
        let e = Error::new(
            ErrorKind::Unsupported,
            "USB gadget keyboard emulation requires a unix host",
        );
        eprintln!("{} {}", "❌ Device Error:".bold().red(), e);
        return Err(e);
    }

    #[cfg(unix)]
    {
        // Keyboard device block
        summary::section("Keyboard Device");
        let keyboard = match GadgetKeyboard::acquire(parameters.device_path.as_deref()) {
            Ok(keyboard) => keyboard,
            Err(e) => {
                eprintln!("{} {}", "❌ Device Error:".bold().red(), e);
                return Err(e);
            }
        };
        println!("{}", "✓ Keyboard emulation channel ready".green());
        println!();

        let progress = ProgressBar::new(parameters.trial_count as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} trials {wide_msg}",
                )
                .unwrap()
                .progress_chars("##-"),
        );

        let mut sampler = LatencySampler::new(keyboard, &parameters);
        let outcome = match sampler.run(&progress).await {
            Ok(outcome) => outcome,
            Err(e) => {
                progress.abandon();
                eprintln!("{} {}", "❌ Measurement Error:".bold().red(), e);
                return Err(e);
            }
        };
        progress.finish_with_message("trials completed");
        println!();

        save_raw_measurements(&parameters.measurements_file, &outcome.samples)?;
        save_trial_summary(&parameters.summary_file, &outcome.samples)?;
        println!(
            "{}",
            format!(
                "✓ Raw measurements written to {}",
                parameters.measurements_file.display()
            )
            .green()
        );
        println!(
            "{}",
            format!(
                "✓ Trial summary written to {}",
                parameters.summary_file.display()
            )
            .green()
        );
        println!();

        // Results block
        summary::section("Results");
        println!(
            "Successful trials: {} / {}",
            outcome.samples.len(),
            parameters.trial_count
        );
        if outcome.dropped > 0 {
            println!(
                "{}",
                format!(
                    "⚠ Timed-out trials: {} (no line written for them)",
                    outcome.dropped
                )
                .yellow()
            );
        }
        match LatencyStatistics::from_samples(&outcome.samples) {
            Some(statistics) => println!("{}", summary::statistics_table(&statistics)),
            None => println!(
                "{}",
                "No successful trials; nothing to summarize.".yellow()
            ),
        }

        println!("\n{}", "✓ Benchmark complete".bold().green());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_reproduce_the_fixed_benchmark() {
        let parameters = BenchmarkingParameters::default();
        assert_eq!(parameters.trial_count, 10);
        assert_eq!(parameters.timeout_ns, 25_000_000);
        assert_eq!(parameters.warmup_ms, 1000);
        assert_eq!(parameters.debounce_ms, 200);
        assert_eq!(parameters.cooldown_ms, 50);
        assert_eq!(parameters.target_key, LockKey::CapsLock);
        assert_eq!(parameters.measurements_file, PathBuf::from("measurements.tsv"));
        assert_eq!(parameters.summary_file, PathBuf::from("results.csv"));
        assert!(parameters.device_path.is_none());
    }

    #[test]
    fn partial_configuration_keeps_defaults() {
        let parameters: BenchmarkingParameters =
            serde_json::from_str(r#"{"TrialCount": 3, "TargetKey": "ScrollLock"}"#).unwrap();
        assert_eq!(parameters.trial_count, 3);
        assert_eq!(parameters.target_key, LockKey::ScrollLock);
        assert_eq!(parameters.timeout_ns, 25_000_000);
        assert_eq!(parameters.debounce_ms, 200);
    }

    #[test]
    fn zero_trial_count_is_rejected() {
        let result = serde_json::from_str::<BenchmarkingParameters>(r#"{"TrialCount": 0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let result = serde_json::from_str::<BenchmarkingParameters>(r#"{"TimeoutNanos": 0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn missing_configuration_file_means_defaults() {
        let parameters =
            load_parameters(Path::new("/nonexistent/appsettings.json")).unwrap();
        assert_eq!(parameters.trial_count, 10);
    }
}
