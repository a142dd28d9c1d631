pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli_args::CliConfig;

#[cfg(feature = "cli")]
mod cli_args {
    use crate::domain::model::{FilterState, SortDirection, SortSpec};
    use crate::utils::error::Result;
    use crate::utils::validation::{
        validate_file_extension, validate_path, validate_positive_number, Validate,
    };
    use clap::Parser;

    fn parse_min_cost(raw: &str) -> std::result::Result<(String, f64), String> {
        let (category, amount) = raw
            .rsplit_once('=')
            .ok_or_else(|| format!("expected CATEGORY=AMOUNT, got '{}'", raw))?;
        let amount: f64 = amount
            .trim()
            .parse()
            .map_err(|e| format!("invalid amount '{}': {}", amount, e))?;
        Ok((category.trim().to_string(), amount))
    }

    #[derive(Debug, Clone, Parser)]
    #[command(name = "sheet-classify")]
    #[command(about = "Classify spreadsheet rows into a fixed taxonomy and export the filtered table")]
    pub struct CliConfig {
        /// Workbook to read: a .csv file or a .zip of CSV sheets
        #[arg(long)]
        pub input: String,

        /// Sheet to use (defaults to the first one)
        #[arg(long)]
        pub sheet: Option<String>,

        /// Column whose values are classified
        #[arg(long)]
        pub column: Option<String>,

        /// Optional TOML configuration file
        #[arg(long)]
        pub config: Option<String>,

        #[arg(long, default_value = "./output")]
        pub output_path: String,

        /// Overrides batching.batch_size from the config file
        #[arg(long)]
        pub batch_size: Option<usize>,

        /// Keep only these categories (repeatable)
        #[arg(long = "category")]
        pub categories: Vec<String>,

        /// Keep only these regions (repeatable)
        #[arg(long = "region")]
        pub regions: Vec<String>,

        /// Minimum cost for a category, as CATEGORY=AMOUNT (repeatable)
        #[arg(long = "min-cost", value_parser = parse_min_cost)]
        pub min_costs: Vec<(String, f64)>,

        #[arg(long)]
        pub sort_by: Option<String>,

        #[arg(long)]
        pub descending: bool,

        /// Print sheet names and headers, then exit
        #[arg(long)]
        pub list_sheets: bool,

        #[arg(long, help = "Enable verbose output")]
        pub verbose: bool,

        #[arg(long, help = "Emit logs as JSON")]
        pub json_logs: bool,

        #[arg(long, help = "Log process CPU and memory per phase")]
        pub monitor: bool,
    }

    impl CliConfig {
        pub fn filter_state(&self) -> FilterState {
            let mut filters = FilterState::new();
            for category in &self.categories {
                filters = filters.with_category(category);
            }
            for region in &self.regions {
                filters = filters.with_region(region);
            }
            for (category, amount) in &self.min_costs {
                filters = filters.with_min_cost(category, *amount);
            }
            filters
        }

        pub fn sort_spec(&self) -> SortSpec {
            let direction = if self.descending {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            };
            SortSpec {
                key: self.sort_by.clone(),
                direction,
            }
        }
    }

    impl Validate for CliConfig {
        fn validate(&self) -> Result<()> {
            validate_file_extension("input", &self.input, &["csv", "zip"])?;
            validate_path("output_path", &self.output_path)?;
            if let Some(batch_size) = self.batch_size {
                validate_positive_number("batch_size", batch_size, 1)?;
            }
            Ok(())
        }
    }

}
