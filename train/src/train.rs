use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use clap::Parser;
use morfo::{Tagger, TaggerConfig};

#[derive(Parser, Debug)]
#[clap(name = "train", about = "Model trainer")]
struct Args {
    /// Configuration file of `key = value` lines.
    #[clap(short = 'c', long)]
    config: PathBuf,

    /// Gold training data, one tab-separated token per line with blank
    /// lines between sentences.
    #[clap(short = 't', long)]
    train: PathBuf,

    /// Gold development data used to select the best training pass.
    #[clap(short = 'd', long)]
    dev: PathBuf,

    /// A file to which the model is output.
    #[clap(short = 'o', long)]
    model_out: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = TaggerConfig::from_reader(File::open(args.config)?)?;
    let mut tagger = Tagger::new(config);

    let train_rdr = File::open(args.train)?;
    let dev_rdr = File::open(args.dev)?;
    tagger.train(train_rdr, dev_rdr)?;

    eprintln!("Storing model.");
    let mut model_wtr = BufWriter::new(File::create(args.model_out)?);
    tagger.store(&mut model_wtr)?;

    Ok(())
}
