mod bytecode;

use relaxng_model::resource::{Manifest, RecordingFiles};
use relaxng_model::{AllowIncompleteTypes, CompileOptions, Compiler, FsFiles, Syntax};
use relaxng_validator::Validator;

use std::cell::RefCell;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::exit;
use std::str::FromStr;

use structopt::StructOpt;

/// `--allow-incomplete-types`: how strictly an unimplemented
/// `datatypeLibrary` is treated.
#[derive(Debug, Clone, Copy)]
struct AllowIncompleteTypesArg(AllowIncompleteTypes);

impl FromStr for AllowIncompleteTypesArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quiet" => Ok(AllowIncompleteTypesArg(AllowIncompleteTypes::Quiet)),
            "warn" => Ok(AllowIncompleteTypesArg(AllowIncompleteTypes::Warn)),
            "error" => Ok(AllowIncompleteTypesArg(AllowIncompleteTypes::Error)),
            other => Err(format!("unknown value {other:?}, expected quiet|warn|error")),
        }
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "rng", about = "RELAX NG schema compiler and validator")]
enum Cli {
    /// Compile a schema (simplification + pattern construction) and write
    /// the result to `out-path` in this crate's bytecode format.
    Convert {
        schema: PathBuf,
        out_path: PathBuf,

        /// Skip simplification; `schema` is already in normal form.
        #[structopt(long)]
        simplified_input: bool,

        /// How to treat a `datatypeLibrary` this crate doesn't implement.
        #[structopt(long, default_value = "error")]
        allow_incomplete_types: AllowIncompleteTypesArg,

        /// Write a `{file_path, hash}` manifest of every resource the
        /// loader consulted to this path, alongside `out-path`.
        #[structopt(long)]
        manifest: Option<PathBuf>,
    },
    /// Validate one or more XML documents against a schema.
    Validate {
        schema: PathBuf,
        xml: Vec<PathBuf>,

        #[structopt(long)]
        simplified_input: bool,

        #[structopt(long, default_value = "error")]
        allow_incomplete_types: AllowIncompleteTypesArg,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match Cli::from_args() {
        Cli::Convert { schema, out_path, simplified_input, allow_incomplete_types, manifest } => {
            convert(schema, out_path, simplified_input, allow_incomplete_types.0, manifest)
        }
        Cli::Validate { schema, xml, simplified_input, allow_incomplete_types } => {
            validate(schema, xml, simplified_input, allow_incomplete_types.0)
        }
    }
}

fn syntax_for(schema: &std::path::Path) -> Syntax {
    match schema.extension().and_then(|e| e.to_str()) {
        Some("rng") => Syntax::Xml,
        _ => {
            eprintln!(
                "warning: {} has no recognised .rng extension; assuming RELAX NG XML syntax anyway \
                 (compact syntax is not supported, see DESIGN.md)",
                schema.display()
            );
            Syntax::Xml
        }
    }
}

fn convert(
    schema: PathBuf,
    out_path: PathBuf,
    simplified_input: bool,
    allow_incomplete_types: AllowIncompleteTypes,
    manifest_path: Option<PathBuf>,
) {
    let syntax = syntax_for(&schema);
    let options = CompileOptions { simplified_input, allow_incomplete_types };
    let manifest = RefCell::new(Manifest::new());

    let model = {
        let files = RecordingFiles::new(FsFiles, &manifest);
        let mut compiler = Compiler::new(files, syntax);
        match compiler.compile_with_options(&schema, &options) {
            Ok(m) => m,
            Err(err) => {
                compiler.dump_diagnostic(&err);
                exit(1);
            }
        }
    };

    let rule = model.borrow();
    let rule = rule.as_ref().expect("compiled schema has a resolved start pattern");
    let encoded = bytecode::encode(rule);

    let mut out = File::create(&out_path).unwrap_or_else(|e| {
        eprintln!("error creating {}: {}", out_path.display(), e);
        exit(1);
    });
    out.write_all(encoded.as_bytes()).unwrap_or_else(|e| {
        eprintln!("error writing {}: {}", out_path.display(), e);
        exit(1);
    });

    if let Some(manifest_path) = manifest_path {
        let json = manifest.borrow().to_json();
        let text = serde_json::to_string_pretty(&json).expect("manifest serialises");
        std::fs::write(&manifest_path, text).unwrap_or_else(|e| {
            eprintln!("error writing {}: {}", manifest_path.display(), e);
            exit(1);
        });
    }
}

fn validate(
    schema: PathBuf,
    xmls: Vec<PathBuf>,
    simplified_input: bool,
    allow_incomplete_types: AllowIncompleteTypes,
) {
    let syntax = syntax_for(&schema);
    let options = CompileOptions { simplified_input, allow_incomplete_types };
    let mut compiler = Compiler::new(FsFiles, syntax);
    let model = match compiler.compile_with_options(&schema, &options) {
        Ok(m) => m,
        Err(err) => {
            compiler.dump_diagnostic(&err);
            exit(1);
        }
    };
    let mut failed = false;
    for xml in xmls {
        let mut f = File::open(&xml).unwrap_or_else(|e| {
            eprintln!("error opening {}: {}", xml.display(), e);
            exit(1);
        });
        let mut doc = String::new();
        if let Err(e) = f.read_to_string(&mut doc) {
            eprintln!("error reading {}: {}", xml.display(), e);
            exit(1);
        }
        let src = doc.clone();
        let reader = xmlparser::Tokenizer::from(&src[..]);
        let mut v = Validator::new(model.clone(), reader);
        eprintln!("Validating {xml:?}");
        loop {
            match v.validate_next() {
                Some(Ok(())) => {}
                Some(Err(err)) => {
                    let (map, d) = v.diagnostic(xml.to_string_lossy().to_string(), doc, &err);
                    let mut emitter = codemap_diagnostic::Emitter::stderr(
                        codemap_diagnostic::ColorConfig::Auto,
                        Some(&map),
                    );
                    emitter.emit(&d[..]);
                    failed = true;
                    break;
                }
                None => break,
            }
        }
    }
    if failed {
        exit(1);
    }
}
