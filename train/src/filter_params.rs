use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use clap::Parser;
use morfo::config::Filtering;
use morfo::{Tagger, TaggerConfig};

#[derive(Parser, Debug)]
#[clap(
    name = "filter-params",
    about = "Re-store a model under an average-mass parameter filter"
)]
struct Args {
    /// Configuration file; its `filter_type` and `param_threshold`
    /// control the filtering.
    #[clap(short = 'c', long)]
    config: PathBuf,

    /// Model file to filter.
    #[clap(short = 'm', long)]
    model: PathBuf,

    /// A file to which the filtered model is output.
    #[clap(short = 'o', long)]
    model_out: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    eprintln!("Reading config file.");
    let config = TaggerConfig::from_reader(File::open(args.config)?)?;

    eprintln!("Loading tagger.");
    let mut tagger = Tagger::read(BufReader::new(File::open(args.model)?))?;

    if config.filtering() == Filtering::AvgValue {
        tagger.set_param_filter(&config);
    } else {
        eprintln!("Warning! Parameter filter is not set to AVG_VALUE.");
        eprintln!("         No filtering will happen.");
    }

    eprintln!("Storing model.");
    let mut model_wtr = BufWriter::new(File::create(args.model_out)?);
    tagger.store(&mut model_wtr)?;

    Ok(())
}
