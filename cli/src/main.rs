use std::env;
use std::io;
use std::io::Write;
use std::process;

use penley::{Err, Grammar, Parser};

fn usage(prog_name: &str) -> String {
  format!(
    r"Usage: {} FILE [options]

Options:
  -h, --help    Print this message
  -c, --chart   Print the parse chart (defaults to not printing)
  -p, --prob    Print the sentence probability (defaults to not printing)",
    prog_name
  )
}

fn parse(parser: &Parser, sentence: &str, print_chart: bool, print_prob: bool) -> Result<(), Err> {
  let sentence = sentence.split(' ').collect::<Vec<_>>();

  let Some(chart) = parser.parse_chart(&sentence) else {
    println!("Parse cancelled");
    return Ok(());
  };

  if print_chart {
    println!("chart:\n{}\n", chart.display(parser.grammar()));
  }

  if print_prob {
    println!("P(sentence) = {}", chart.sentence_probability());
  }

  let trees = penley::forest::trees(&chart, parser.grammar());

  println!(
    "Parsed {} tree{}",
    trees.len(),
    if trees.len() == 1 { "" } else { "s" }
  );

  for t in trees {
    println!("score: {}", t.score());
    println!("{}", t.penn());
    println!("{}", t);
  }

  Ok(())
}

struct Args {
  filename: String,
  print_chart: bool,
  print_prob: bool,
}

impl Args {
  fn make_error_message(msg: &str, prog_name: impl AsRef<str>) -> String {
    format!("argument error: {}.\n\n{}", msg, usage(prog_name.as_ref()))
  }

  fn parse(v: Vec<String>) -> Result<Self, String> {
    if v.is_empty() {
      return Err(Self::make_error_message("bad argument vector", "penley"));
    }

    let args_len = v.len();
    let mut iter = v.into_iter();
    let prog_name = iter.next().unwrap();

    if args_len < 2 {
      return Err(Self::make_error_message("not enough arguments", prog_name));
    }

    let mut filename: Option<String> = None;
    let mut print_chart = false; // default to *not* printing the chart
    let mut print_prob = false;

    for o in iter {
      if o == "-h" || o == "--help" {
        println!("{}", usage(&prog_name));
        process::exit(0);
      } else if o == "-c" || o == "--chart" {
        print_chart = true;
      } else if o == "-p" || o == "--prob" {
        print_prob = true;
      } else if filename.is_none() {
        filename = Some(o);
      } else {
        return Err(Self::make_error_message("invalid arguments", prog_name));
      }
    }

    if let Some(filename) = filename {
      Ok(Self {
        filename,
        print_chart,
        print_prob,
      })
    } else {
      Err(Self::make_error_message("missing filename", prog_name))
    }
  }
}

fn main() -> Result<(), Err> {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let opts = match Args::parse(env::args().collect()) {
    Ok(opts) => opts,
    Err(msg) => {
      eprintln!("{}", msg);
      process::exit(255);
    }
  };

  let g = Grammar::read_from_file(&opts.filename)?;
  let parser = Parser::new(g)?;

  let mut input = String::new();
  loop {
    print!("> ");
    io::stdout().flush()?;

    match io::stdin().read_line(&mut input) {
      Ok(_) => {
        if input.is_empty() {
          // ctrl+d
          return Ok(());
        }
        parse(&parser, input.trim(), opts.print_chart, opts.print_prob)?;
        input.clear();
      }
      Err(error) => return Err(error.into()),
    }
  }
}
