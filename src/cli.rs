//! CLI argument parsing for pcr-flatten

use crate::batch::BatchConfig;
use crate::comparison::ComparisonFilter;
use crate::detection::{BaselineRule, Criterion, DetectionConfig, SanityMode, TargetSource};
use crate::records::{RecordId, RecordSelection, SortKey, SortOrder};
use crate::series::Normalization;
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
    /// CSV format for spreadsheet analysis
    Csv,
}

/// Named configuration presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    Default,
    /// Deeper threshold with slope sanity check
    Strict,
    /// Shallower threshold with average sanity check
    Permissive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SanityArg {
    Off,
    /// Reading at the minimum must be below the early-cycle mean
    Average,
    /// Least-squares slope up to the minimum must be negative
    Slope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortByArg {
    /// Record id
    Id,
    /// CUSUM minimum (deepest first with --sort-order up)
    Cusum,
}

/// Which comparison results to report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FilterArg {
    /// Records whose decision flips
    Changes,
    /// Records the test configuration would flatten
    Threshold,
    /// Records the test configuration's sanity check vetoed
    Sanity,
    All,
}

impl From<FilterArg> for ComparisonFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::Changes => Self::Changes,
            FilterArg::Threshold => Self::Threshold,
            FilterArg::Sanity => Self::Sanity,
            FilterArg::All => Self::All,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "pcr-flatten")]
#[command(version)]
#[command(about = "CUSUM trend detection and baseline flattening for PCR amplification curves", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report flatten decisions without changing any readings
    Decide(DecideArgs),
    /// Decide and flatten leading declines
    Flatten(FlattenArgs),
    /// Compare two parameter sets and report where the decision changes
    Compare(CompareArgs),
}

/// Detection settings shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct DetectionArgs {
    /// TOML detection config file (flags below override it)
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Start from a named preset instead of the defaults
    #[arg(long = "preset", value_enum, conflicts_with = "config")]
    pub preset: Option<Preset>,

    /// CUSUM tolerance k (>= 0; larger ignores smaller declines)
    #[arg(short = 'k', long = "k", value_name = "K")]
    pub k: Option<f64>,

    /// Flatten when the CUSUM minimum is at or below this value (e.g. -80)
    #[arg(long = "threshold", allow_hyphen_values = true, value_name = "VALUE")]
    pub threshold: Option<f64>,

    /// Sanity check applied after the threshold test
    #[arg(long = "sanity", value_enum)]
    pub sanity: Option<SanityArg>,

    /// Use clamp(min_index, 1, 5) leading readings for the average check
    #[arg(long = "continuous-baseline")]
    pub continuous_baseline: bool,

    /// Slope must be below -TOLERANCE for the slope check to pass
    #[arg(long = "slope-tolerance", value_name = "TOLERANCE")]
    pub slope_tolerance: Option<f64>,

    /// Moving-average window (positive, odd)
    #[arg(short = 'w', long = "window")]
    pub window: Option<usize>,

    /// Decide with the steepest single-step drop instead of CUSUM
    #[arg(long = "derivative", conflicts_with = "k")]
    pub derivative: bool,

    /// Threshold for the derivative criterion
    #[arg(long = "derivative-threshold", allow_hyphen_values = true, value_name = "VALUE")]
    pub derivative_threshold: Option<f64>,

    /// Rescale readings onto the plot height before smoothing
    #[arg(long = "normalize")]
    pub normalize: bool,

    /// Take the flattening target from the smoothed curve
    #[arg(long = "smoothed-target")]
    pub smoothed_target: bool,

    /// Noise half-width as a fraction of the series standard deviation
    #[arg(long = "noise-fraction", value_name = "FRACTION")]
    pub noise_fraction: Option<f64>,
}

impl DetectionArgs {
    /// Resolve file/preset and flag overrides into a validated config
    pub fn to_config(&self) -> Result<DetectionConfig> {
        let mut config = match (&self.config, self.preset) {
            (Some(path), _) => {
                let source = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                DetectionConfig::from_toml_str(&source)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            (None, Some(Preset::Strict)) => DetectionConfig::strict(),
            (None, Some(Preset::Permissive)) => DetectionConfig::permissive(),
            (None, _) => DetectionConfig::default(),
        };

        if let Some(k) = self.k {
            config.criterion = Criterion::Cusum { k };
        }
        if self.derivative {
            config.criterion = Criterion::Derivative {
                threshold: self
                    .derivative_threshold
                    .unwrap_or(crate::detection::DEFAULT_DERIVATIVE_THRESHOLD),
            };
        } else if let (Some(threshold), Criterion::Derivative { .. }) =
            (self.derivative_threshold, config.criterion)
        {
            config.criterion = Criterion::Derivative { threshold };
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(sanity) = self.sanity {
            config.sanity = self.sanity_mode(sanity);
        } else if self.continuous_baseline || self.slope_tolerance.is_some() {
            bail!("--continuous-baseline and --slope-tolerance require --sanity");
        }
        if let Some(window) = self.window {
            config.smoothing_window = window;
        }
        if self.normalize {
            config.normalization = Normalization::plot_scale();
        }
        if self.smoothed_target {
            config.target = TargetSource::Smoothed;
        }
        if let Some(fraction) = self.noise_fraction {
            config.noise_fraction = fraction;
        }

        config.validate()?;
        Ok(config)
    }

    fn sanity_mode(&self, sanity: SanityArg) -> SanityMode {
        match sanity {
            SanityArg::Off => SanityMode::Off,
            SanityArg::Average => SanityMode::Average {
                rule: if self.continuous_baseline {
                    BaselineRule::Continuous
                } else {
                    BaselineRule::Legacy
                },
            },
            SanityArg::Slope => SanityMode::Slope {
                tolerance: self.slope_tolerance.unwrap_or(0.0),
            },
        }
    }
}

/// Record selection and execution settings shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// JSON record set: [{"id": 1, "readings": [...], "std_dev": 12.5}, ...]
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input: PathBuf,

    /// Only these record ids (comma-separated)
    #[arg(long = "ids", value_delimiter = ',', value_name = "IDS")]
    pub ids: Option<Vec<RecordId>>,

    /// Order records by id or by CUSUM minimum
    #[arg(long = "sort-by", value_enum, default_value = "id")]
    pub sort_by: SortByArg,

    /// Ascending or descending
    #[arg(long = "sort-order", value_enum, default_value = "up")]
    pub sort_order: SortArg,

    /// Stop after this many records (applied after ordering)
    #[arg(long = "limit")]
    pub limit: Option<usize>,

    /// Skip records with fewer readings than this
    #[arg(long = "min-readings", default_value_t = crate::batch::DEFAULT_MIN_READINGS)]
    pub min_readings: usize,

    /// Worker threads (0 = available parallelism)
    #[arg(long = "workers", default_value_t = 0)]
    pub workers: usize,

    /// Seed for flattening noise (reproducible output)
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    /// Records per sink write
    #[arg(long = "sink-batch-size", default_value_t = crate::batch::DEFAULT_SINK_BATCH_SIZE)]
    pub sink_batch_size: usize,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Write the report here instead of stdout
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,
}

impl RunArgs {
    pub fn selection(&self) -> RecordSelection {
        RecordSelection {
            ids: self.ids.clone(),
            sort_by: match self.sort_by {
                SortByArg::Id => SortKey::Id,
                SortByArg::Cusum => SortKey::Cusum,
            },
            order: match self.sort_order {
                SortArg::Up => SortOrder::Up,
                SortArg::Down => SortOrder::Down,
            },
            limit: self.limit,
        }
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            workers: self.workers,
            min_readings: self.min_readings,
            sink_batch_size: self.sink_batch_size,
            seed: self.seed,
        }
    }
}

#[derive(Args, Debug)]
pub struct DecideArgs {
    #[command(flatten)]
    pub detection: DetectionArgs,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug)]
pub struct FlattenArgs {
    #[command(flatten)]
    pub detection: DetectionArgs,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Base settings for both sides (threshold, sanity, window, ...)
    #[command(flatten)]
    pub detection: DetectionArgs,

    #[command(flatten)]
    pub run: RunArgs,

    /// Tolerance k for the default side
    #[arg(long = "default-k", default_value_t = 0.0)]
    pub default_k: f64,

    /// Tolerance k for the test side (required unless the test side uses the
    /// derivative); `--k` is accepted as an alias
    #[arg(long = "test-k")]
    pub test_k: Option<f64>,

    /// Default side uses the derivative criterion
    #[arg(long = "use-default-derivative")]
    pub use_default_derivative: bool,

    /// Test side uses the derivative criterion
    #[arg(long = "use-test-derivative")]
    pub use_test_derivative: bool,

    /// Report only these records
    #[arg(long = "only-failed", value_enum, default_value = "changes")]
    pub only_failed: FilterArg,
}

impl CompareArgs {
    /// Default-side and test-side configs built on the shared detection settings
    ///
    /// Each side picks its own criterion, so `--derivative` is rejected and
    /// `--k` stands for `--test-k`.
    pub fn configs(&self) -> Result<(DetectionConfig, DetectionConfig)> {
        if self.detection.derivative {
            bail!("compare takes --use-default-derivative or --use-test-derivative, not --derivative");
        }
        let test_k = match (self.test_k, self.detection.k) {
            (Some(_), Some(_)) => bail!("--k is an alias for --test-k; give only one"),
            (test_k, k) => test_k.or(k),
        };

        let base = self.detection.to_config()?;
        let derivative = Criterion::Derivative {
            threshold: self
                .detection
                .derivative_threshold
                .unwrap_or(crate::detection::DEFAULT_DERIVATIVE_THRESHOLD),
        };

        let default_criterion = if self.use_default_derivative {
            derivative
        } else {
            Criterion::Cusum { k: self.default_k }
        };

        let test_criterion = if self.use_test_derivative {
            derivative
        } else {
            match test_k {
                Some(k) => Criterion::Cusum { k },
                None => bail!("--test-k is required unless --use-test-derivative is set"),
            }
        };

        Ok((
            base.clone().with_criterion(default_criterion),
            base.with_criterion(test_criterion),
        ))
    }
}
