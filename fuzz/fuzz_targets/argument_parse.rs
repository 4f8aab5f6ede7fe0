#![no_main]

use cmdhost_args::{ArgumentParser, ArgumentSchemaEntry, TYPE_NUMBER, TYPE_STRING};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let tokens = raw.split_whitespace().map(str::to_string).collect::<Vec<_>>();

    let mut parser = ArgumentParser::new(tokens.clone());
    let Ok(initial) = parser.parse() else {
        return;
    };
    assert!(initial.positional.len() <= tokens.len());

    parser
        .add_schema([
            ArgumentSchemaEntry::boolean().full("verbose").short("v"),
            ArgumentSchemaEntry::new(TYPE_NUMBER).full("port").short("p"),
            ArgumentSchemaEntry::new(TYPE_STRING).full("name"),
        ])
        .expect("named entries are accepted");
    match parser.parse() {
        Ok(parsed) => {
            assert!(parsed.positional.len() <= initial.positional.len());
            assert!(parsed.get("verbose").is_some());
            let again = parser.parse().expect("re-parse is deterministic");
            assert_eq!(again.positional, parsed.positional);
        }
        Err(error) => assert!(!error.to_string().trim().is_empty()),
    }
});
