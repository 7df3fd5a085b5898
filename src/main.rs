use clap::Parser;
use std::path::PathBuf;
use waste_predictor::{train_waste_model, DEFAULT_DATA_PATH};

// text dashboard and entry point
// Steps
// 1. Set up logging
// 2. Train the model on the dataset
// 3. Print metrics
// 4. Print a sample of actual vs predicted values
// 5. Print a residual summary

const SAMPLE_ROWS: usize = 10;

/// Fit the waste model on a CSV dataset and print its test-set accuracy.
#[derive(Parser, Debug)]
#[command(name = "waste-predictor", version, about)]
struct Cli {
    /// Path to the waste dataset (CSV with a header row)
    #[arg(default_value = DEFAULT_DATA_PATH)]
    path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    // 1. Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waste_predictor=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // 2. Train the model on the dataset
    let run = train_waste_model(&cli.path)?;

    // 3. Print metrics
    println!("SMART WASTE ANALYTICS");
    println!("{}", run.metrics);
    println!(
        "{} rows loaded, {} encoded features, {} test rows",
        run.dataset.height(),
        run.model.schema().n_features(),
        run.y_test.len()
    );

    // 4. Print a sample of actual vs predicted values
    println!();
    println!("{:>8} {:>12} {:>12}", "row", "actual kg", "predicted kg");
    for ((row, actual), predicted) in run
        .test_indices
        .iter()
        .zip(run.y_test.iter())
        .zip(run.y_pred.iter())
        .take(SAMPLE_ROWS)
    {
        println!("{row:>8} {actual:>12.2} {predicted:>12.2}");
    }

    // 5. Print a residual summary
    let residuals = run.residuals();
    let min = residuals.iter().copied().fold(f64::INFINITY, f64::min);
    let max = residuals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    println!();
    println!(
        "residuals: mean {:.2}, std {:.2}, min {:.2}, max {:.2}",
        residuals.mean().unwrap_or(f64::NAN),
        residuals.std(0.0),
        min,
        max
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_dataset_path() {
        let cli = Cli::try_parse_from(["waste-predictor"]).unwrap();
        assert_eq!(cli.path, PathBuf::from(DEFAULT_DATA_PATH));
    }

    #[test]
    fn test_cli_takes_positional_path() {
        let cli = Cli::try_parse_from(["waste-predictor", "data/waste.csv"]).unwrap();
        assert_eq!(cli.path, PathBuf::from("data/waste.csv"));
    }
}
