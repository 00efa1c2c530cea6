use clap::Args;
use std::io;

use markowitz_core::simulation::synthetic::{
    generate_returns, SyntheticAsset, SyntheticReturnsInput,
};

/// Arguments for synthetic daily-return generation
#[derive(Args)]
pub struct SimulateArgs {
    /// Comma-separated annualized mean returns (e.g. "0.08,0.10,0.05")
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
    pub means: Vec<f64>,

    /// Comma-separated annualized volatilities, one per mean
    #[arg(long, value_delimiter = ',', required = true)]
    pub vols: Vec<f64>,

    /// Number of daily observations
    #[arg(long, default_value = "252")]
    pub days: usize,

    /// Seed for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,

    /// Comma-separated asset names (default ASSET_1, ASSET_2, ...)
    #[arg(long, value_delimiter = ',')]
    pub names: Option<Vec<String>>,
}

/// Write a synthetic return CSV to stdout.
pub fn run_simulate(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.means.len() != args.vols.len() {
        return Err(format!(
            "--means has {} values but --vols has {}",
            args.means.len(),
            args.vols.len()
        )
        .into());
    }
    let names = match args.names {
        Some(n) if n.len() != args.means.len() => {
            return Err(format!(
                "--names has {} values but --means has {}",
                n.len(),
                args.means.len()
            )
            .into())
        }
        Some(n) => n,
        None => (1..=args.means.len()).map(|i| format!("ASSET_{}", i)).collect(),
    };

    let assets = names
        .into_iter()
        .zip(args.means.iter().zip(args.vols.iter()))
        .map(|(name, (mean, vol))| SyntheticAsset {
            name,
            annual_mean: *mean,
            annual_volatility: *vol,
        })
        .collect();

    let matrix = generate_returns(&SyntheticReturnsInput {
        assets,
        num_days: args.days,
        trading_days: 252,
        seed: args.seed,
        start_date: None,
    })?;

    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());
    let mut header = vec!["Date".to_string()];
    header.extend(matrix.assets().iter().cloned());
    wtr.write_record(&header)?;
    for (label, row) in matrix.index().iter().zip(matrix.rows()) {
        let mut record = vec![label.clone()];
        record.extend(row.iter().map(|v| format!("{:.8}", v)));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}
