use bytes::Bytes;
use clap::{Command, arg, crate_version};
use dnart::{DnameArt, Path, make_key, unmake_key, wire};

const RCH: &str = "unreachable was reached";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let long_help = "Examples:
---------
Canonical dump:  `dnart dump -i names.txt`
Point lookup:    `dnart find -i names.txt -n www.example.com.`
Node population: `dnart stats -i names.txt`

The input file holds one presentation-form domain name per line; empty
lines and lines starting with '#' are skipped.";

    let mut main_cmd = Command::new("dnart")
        .about("Index domain names in an adaptive radix tree")
        .after_long_help(long_help)
        .version(crate_version!());
    main_cmd = main_cmd.subcommand(
        Command::new("dump")
            .arg(arg!(-i --input <PATH> "file of domain names").required(true))
            .about("print the names in canonical order"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("find")
            .arg(arg!(-i --input <PATH> "file of domain names").required(true))
            .arg(arg!(-n --name <NAME> "name to look up").required(true))
            .about("look a name up and show the recorded path"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("stats")
            .arg(arg!(-i --input <PATH> "file of domain names").required(true))
            .about("show node-family population counts"),
    );

    let matches = main_cmd.get_matches();

    if let Some(cmd) = matches.subcommand_matches("dump") {
        let path_in = cmd.get_one::<String>("input").expect(RCH);
        let tree = load(path_in)?;
        tree.walk(|key, _| {
            println!("{}", wire::to_presentation(&unmake_key(key)));
        });
    }

    if let Some(cmd) = matches.subcommand_matches("find") {
        let path_in = cmd.get_one::<String>("input").expect(RCH);
        let name = cmd.get_one::<String>("name").expect(RCH);
        let tree = load(path_in)?;
        let key = make_key(&wire::parse(name)?)?;
        let mut path = Path::new();
        match tree.find_path(&mut path, &key) {
            Ok(()) => {
                let top = path.top().expect(RCH);
                match tree.value(top) {
                    Some(val) => println!(
                        "found {} = {} (path height {})",
                        name,
                        String::from_utf8_lossy(val),
                        path.height()
                    ),
                    None => println!("found {} with no value (path height {})", name, path.height()),
                }
            }
            Err(_) => println!("{} not found (deepest match at height {})", name, path.height()),
        }
    }

    if let Some(cmd) = matches.subcommand_matches("stats") {
        let path_in = cmd.get_one::<String>("input").expect(RCH);
        let tree = load(path_in)?;
        let stats = tree.stats();
        println!("names:   {}", stats.leaves);
        println!("node4:   {}", stats.node4);
        println!("node16:  {}", stats.node16);
        println!("node32:  {}", stats.node32);
        println!("node38:  {}", stats.node38);
        println!("node48:  {}", stats.node48);
        println!("node256: {}", stats.node256);
        println!("height:  {}", stats.max_height);
    }

    Ok(())
}

fn load(path: &str) -> Result<DnameArt, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let mut tree = DnameArt::new();
    let mut loaded = 0usize;
    for line in text.lines() {
        let name = line.trim();
        if name.is_empty() || name.starts_with('#') {
            continue;
        }
        let wire_form = match wire::parse(name) {
            Ok(w) => w,
            Err(e) => {
                log::warn!("skipping {name:?}: {e}");
                continue;
            }
        };
        let key = make_key(&wire_form)?;
        tree.insert(&key, Bytes::from(name.to_owned()))?;
        loaded += 1;
    }
    log::info!("loaded {} names ({} distinct)", loaded, tree.len());
    Ok(tree)
}
