//! strata-tokengen: Generate text from a bigram model file.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use serde::Serialize;
use tracing::info;

use strata_tokengen::cli;
use strata_tokengen::engine::{GenerationConfig, StatsReport, StopReason, TextRunner};
use strata_tokengen::{BigramModel, ModelFile};

#[derive(Parser)]
#[command(name = "strata-tokengen", about = "Generate text from a bigram model file")]
struct Args {
    /// Path to a JSON model file (vocabulary + transition logits)
    #[arg(short = 'm', long)]
    model: PathBuf,

    /// Prompt text
    #[arg(short = 'p', long, conflicts_with_all = ["file", "token_ids", "stdin"])]
    prompt: Option<String>,

    /// Read prompt from file
    #[arg(short = 'f', long, conflicts_with_all = ["token_ids", "stdin"])]
    file: Option<PathBuf>,

    /// Read prompt from stdin
    #[arg(long, conflicts_with = "token_ids")]
    stdin: bool,

    /// Pre-tokenized input: comma-separated token IDs (bypasses tokenizer)
    #[arg(long)]
    token_ids: Option<String>,

    /// JSON generation config; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Total sequence budget: prompt plus generated tokens
    #[arg(short = 'n', long)]
    seq_len: Option<usize>,

    /// Feed the full token history each step instead of using the cache
    #[arg(long)]
    full_history: bool,

    /// Override the end-of-sequence token id
    #[arg(long)]
    eos_id: Option<u32>,

    /// Don't prepend BOS when encoding the prompt
    #[arg(long)]
    no_bos: bool,

    /// Temperature (0.0 = greedy)
    #[arg(long)]
    temp: Option<f32>,

    /// Top-k sampling (0 = disabled)
    #[arg(long)]
    top_k: Option<usize>,

    /// Top-p (nucleus) sampling
    #[arg(long)]
    top_p: Option<f32>,

    /// Random seed for sampling
    #[arg(short = 's', long)]
    seed: Option<u64>,

    /// Don't echo the prompt in output
    #[arg(long)]
    no_display_prompt: bool,

    /// Output format: text or json
    #[arg(long, default_value = "text", value_parser = validate_output_format)]
    output_format: String,

    /// Suppress all logging
    #[arg(long)]
    log_disable: bool,
}

fn validate_output_format(s: &str) -> Result<String, String> {
    match s {
        "text" | "json" => Ok(s.to_string()),
        _ => Err(format!("Unknown output format '{}'. Options: text, json", s)),
    }
}

enum Prompt {
    Text(String),
    TokenIds(Vec<u32>),
}

#[derive(Serialize)]
struct JsonOutput {
    model: String,
    prompt: String,
    output: String,
    prompt_tokens: usize,
    generated_tokens: usize,
    stop_reason: StopReason,
    stats: StatsReport,
    config: GenerationConfig,
}

fn main() {
    let args = Args::parse();
    cli::init_logging(args.log_disable);

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn build_config(args: &Args) -> Result<GenerationConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => GenerationConfig::from_json_file(path)?,
        None => GenerationConfig::default(),
    };
    if let Some(seq_len) = args.seq_len {
        config.seq_len = seq_len;
    }
    if args.full_history {
        config.use_kv_cache = false;
    }
    if args.eos_id.is_some() {
        config.eos_id = args.eos_id;
    }
    if args.no_bos {
        config.add_bos = false;
    }
    if let Some(temp) = args.temp {
        config.sampling.temperature = temp;
    }
    if let Some(top_k) = args.top_k {
        config.sampling.top_k = top_k;
    }
    if let Some(top_p) = args.top_p {
        config.sampling.top_p = top_p;
    }
    if args.seed.is_some() {
        config.sampling.seed = args.seed;
    }
    Ok(config)
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&args)?;
    let model_file = ModelFile::from_json_file(&args.model)?;

    let tokenizer = Box::new(model_file.tokenizer(config.add_bos));
    let decoder = Box::new(BigramModel::new(
        &model_file,
        config.sampling.clone(),
        config.use_kv_cache,
    )?);
    let mut runner = TextRunner::new(tokenizer, decoder, config);

    let stream = args.output_format == "text";
    let mut out = cli::TokenStream::new(std::io::stdout(), runner.stop_handle());

    let (input_display, prompt) = match &args.token_ids {
        Some(ids) => {
            let token_ids = cli::parse_token_ids(ids)?;
            (format!("[{} token IDs]", token_ids.len()), Prompt::TokenIds(token_ids))
        }
        None => {
            let input = cli::read_input(args.prompt.as_deref(), args.file.as_deref(), args.stdin)?;
            if stream && !args.no_display_prompt {
                out.write_piece(&input);
            }
            (input.clone(), Prompt::Text(input))
        }
    };
    if !out.is_open() {
        return Ok(());
    }

    let mut emit = |piece: &str| {
        if stream {
            out.write_piece(piece);
        }
    };
    let output = match prompt {
        Prompt::Text(text) => runner.generate(&text, &mut emit)?,
        Prompt::TokenIds(token_ids) => runner.generate_from_token_ids(&token_ids, &mut emit)?,
    };

    let report = output.stats.report();
    info!(
        prompt_tokens = report.prompt_tokens,
        generated_tokens = report.generated_tokens,
        generation_tok_per_sec = report.generation_tok_per_sec,
        stop_reason = %output.stop_reason,
        "Generation finished"
    );

    if stream {
        out.write_piece("\n");
    } else {
        let json = JsonOutput {
            model: args.model.display().to_string(),
            prompt: input_display,
            output: output.text,
            prompt_tokens: output.prompt_tokens,
            generated_tokens: output.generated_tokens,
            stop_reason: output.stop_reason,
            stats: report,
            config: runner.config().clone(),
        };
        println!("{}", serde_json::to_string_pretty(&json)?);
    }

    Ok(())
}
