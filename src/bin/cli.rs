use std::env;
use std::io;
use std::io::Write;
use std::process;

use pcfg::Err;
use pcfg::Parser;

fn usage(prog_name: &str) -> String {
  format!(
    r"
Usage: {} GRAMMAR [options]

Reads one whitespace-tokenized query per line from stdin and prints its
most probable parse, or 'no match'.

Options:
  -h, --help     Print this message
  -c, --compact  Print trees on a single line (defaults to indented)",
    prog_name
  )
}

fn main() -> Result<(), Err> {
  env_logger::Builder::from_default_env()
    .format_timestamp(None)
    .init();

  let opts: Vec<String> = env::args().collect();
  let prog_name = opts[0].clone();

  if opts.len() < 2 {
    println!("{}", usage(&prog_name));
    process::exit(1);
  }

  let mut opts = opts.into_iter().skip(1);
  let filename = opts.next().unwrap();

  let mut compact = false;
  for o in opts {
    if o == "-h" || o == "--help" {
      println!("{}", usage(&prog_name));
      process::exit(0);
    } else if o == "-c" || o == "--compact" {
      compact = true;
    }
  }

  let parser = Parser::read_from_file(&filename)?;

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
        input.make_ascii_lowercase();
        let query = input.split_whitespace().collect::<Vec<_>>();
        match parser.parse(&query) {
          Some(tree) if compact => println!("{}", tree.compact()),
          Some(tree) => println!("{}", tree),
          None => println!("no match"),
        }
        input.clear();
      }
      Err(error) => return Err(error.into()),
    }
  }
}
