use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;
use morfo::Tagger;

#[derive(Parser, Debug)]
#[clap(name = "label", about = "Label and lemmatize input with a trained model")]
struct Args {
    /// Model file produced by the train command.
    #[clap(short = 'm', long)]
    model: PathBuf,

    /// Input file in the 5-field tab-separated format with empty lemma
    /// and label fields; standard input when omitted.
    #[clap(short = 'i', long)]
    input: Option<PathBuf>,

    /// Emit each sentence as soon as it has been read, instead of
    /// reading the whole input first.
    #[clap(long)]
    stream: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut tagger = Tagger::read(BufReader::new(File::open(args.model)?))?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match (args.input, args.stream) {
        (Some(path), false) => tagger.label(BufReader::new(File::open(path)?), &mut out)?,
        (Some(path), true) => tagger.label_stream(BufReader::new(File::open(path)?), &mut out)?,
        (None, false) => tagger.label(io::stdin().lock(), &mut out)?,
        (None, true) => tagger.label_stream(io::stdin().lock(), &mut out)?,
    }
    out.flush()?;

    Ok(())
}
