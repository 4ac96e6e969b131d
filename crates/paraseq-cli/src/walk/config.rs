use core::time::Duration;

use anyhow::bail;
use clap::{Parser, ValueEnum};

/// Runtime configuration for the `paraseq` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults suitable for a quick local
/// run.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "paraseq",
    version,
    about = "Walk a synthetic sequence with many concurrent workers"
)]
pub struct CliArgs {
    /// Number of items in the sequence.
    ///
    /// Environment variable: `ITEMS`
    #[arg(long, env = "ITEMS", default_value_t = 100_000)]
    pub items: u64,

    /// Number of worker tasks advancing the shared enumerator.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 8)]
    pub workers: usize,

    /// Simulated latency of every fetch, in microseconds. `0` fetches
    /// without suspending.
    ///
    /// Environment variable: `FETCH_LATENCY_US`
    #[arg(long, env = "FETCH_LATENCY_US", default_value_t = 0)]
    pub fetch_latency_us: u64,

    /// Number of full passes over the sequence. The enumerator is reused
    /// between passes.
    ///
    /// Environment variable: `PASSES`
    #[arg(long, env = "PASSES", default_value_t = 1)]
    pub passes: u32,

    /// Claim store holding items between advance and redeem.
    ///
    /// Environment variable: `CLAIM_STORE`
    #[arg(long, env = "CLAIM_STORE", value_enum, default_value_t = StoreKind::Sharded)]
    pub store: StoreKind,
}

/// Which claim store backs the enumerator.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Sharded concurrent map.
    Sharded,
    /// Single mutex around a hash map.
    Lock,
}

#[derive(Debug, Clone)]
pub struct WalkConfig {
    pub items: u64,
    pub workers: usize,
    pub fetch_latency: Duration,
    pub passes: u32,
    pub store: StoreKind,
}

impl TryFrom<CliArgs> for WalkConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if args.passes == 0 {
            bail!("PASSES must be greater than 0");
        }

        Ok(Self {
            items: args.items,
            workers: args.workers,
            fetch_latency: Duration::from_micros(args.fetch_latency_us),
            passes: args.passes,
            store: args.store,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<WalkConfig> {
        let args = CliArgs::try_parse_from(core::iter::once("paraseq").chain(args.iter().copied()))?;
        WalkConfig::try_from(args)
    }

    #[test]
    fn accepts_explicit_flags() {
        let config = parse(&[
            "--items",
            "42",
            "--workers",
            "3",
            "--fetch-latency-us",
            "250",
            "--passes",
            "2",
            "--store",
            "lock",
        ])
        .unwrap();

        assert_eq!(config.items, 42);
        assert_eq!(config.workers, 3);
        assert_eq!(config.fetch_latency, Duration::from_micros(250));
        assert_eq!(config.passes, 2);
        assert_eq!(config.store, StoreKind::Lock);
    }

    #[test]
    fn rejects_zero_workers() {
        let err = parse(&["--workers", "0"]).unwrap_err();
        assert!(err.to_string().contains("NUM_WORKERS"));
    }

    #[test]
    fn rejects_zero_passes() {
        let err = parse(&["--workers", "1", "--passes", "0"]).unwrap_err();
        assert!(err.to_string().contains("PASSES"));
    }

    #[test]
    fn rejects_unknown_store() {
        assert!(parse(&["--store", "btree"]).is_err());
    }
}
