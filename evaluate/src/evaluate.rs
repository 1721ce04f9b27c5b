use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use clap::Parser;
use morfo::Tagger;

#[derive(Parser, Debug)]
#[clap(name = "evaluate", about = "Evaluate a trained model on gold data")]
struct Args {
    /// Model file produced by the train command.
    #[clap(short = 'm', long)]
    model: PathBuf,

    /// Gold test data in the 5-field tab-separated format.
    #[clap(short = 't', long)]
    test: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut tagger = Tagger::read(BufReader::new(File::open(args.model)?))?;
    tagger.evaluate(BufReader::new(File::open(args.test)?))?;

    Ok(())
}
