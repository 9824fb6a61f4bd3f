//! Developer utility: decode a media file into a summary, print bucket
//! statistics, and optionally write it to a cache directory.
//!
//! Usage: `waveline-scan <file> [--width N] [--cache DIR]`

use std::path::PathBuf;

use waveline::{
    DisplaySummary, EngineConfig, SummaryStore, SymphoniaSource, TrackKey,
    session::{DecodeSession, PcmSource},
    shared::SharedSummary,
    store::CachePolicy,
};

struct Options {
    path: PathBuf,
    width: usize,
    cache_dir: Option<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };
    let config = EngineConfig::default();
    let key = TrackKey::new(options.path.display().to_string());
    let source = SymphoniaSource::open(&options.path).map_err(|err| err.to_string())?;
    let spec = source.spec();
    println!("File: {}", options.path.display());
    println!(
        "Stream: {} Hz, {} channel(s), {:.2} s",
        spec.sample_rate, spec.channels, spec.duration_seconds
    );

    let store = match &options.cache_dir {
        Some(dir) => SummaryStore::open(dir),
        None => SummaryStore::disabled(),
    };
    let store = std::sync::Arc::new(store);
    let shared = SharedSummary::new();
    let token = shared.begin_track(&key);
    let session = DecodeSession::new(
        key.clone(),
        token,
        shared.clone(),
        std::sync::Arc::clone(&store),
        CachePolicy {
            max_cached_duration_seconds: config.max_cached_duration_seconds,
        },
        config.bucket_count,
    );
    let summary = session.run(source).map_err(|err| err.to_string())?;
    println!(
        "Summary: {} buckets x {} channel(s)",
        summary.bucket_count(),
        summary.channels()
    );

    let display = shared
        .snapshot_for_width(options.width, true)
        .ok_or("No summary published")?;
    print_sparkline(&display);

    if options.cache_dir.is_some() {
        println!("Cached: {}", store.exists(&key));
    }
    Ok(())
}

fn print_sparkline(display: &DisplaySummary) {
    const LEVELS: [char; 8] = ['\u{2581}', '\u{2582}', '\u{2583}', '\u{2584}', '\u{2585}', '\u{2586}', '\u{2587}', '\u{2588}'];
    let mut line = String::with_capacity(display.width());
    for x in 0..display.width() {
        let bucket = display.column(0, x);
        let level = bucket.max.abs().max(bucket.min.abs()).clamp(0.0, 1.0);
        let idx = ((level * (LEVELS.len() - 1) as f32).round() as usize).min(LEVELS.len() - 1);
        line.push(LEVELS[idx]);
    }
    println!("{line}");
}

fn parse_args(args: Vec<String>) -> Result<Option<Options>, String> {
    let mut path = None;
    let mut width = 80usize;
    let mut cache_dir = None;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                println!("Usage: waveline-scan <file> [--width N] [--cache DIR]");
                return Ok(None);
            }
            "--width" => {
                let value = iter.next().ok_or("--width requires a value")?;
                width = value
                    .parse()
                    .map_err(|_| format!("Invalid width: {value}"))?;
            }
            "--cache" => {
                let value = iter.next().ok_or("--cache requires a value")?;
                cache_dir = Some(PathBuf::from(value));
            }
            other if path.is_none() => path = Some(PathBuf::from(other)),
            other => return Err(format!("Unexpected argument: {other}")),
        }
    }
    let path = path.ok_or("Usage: waveline-scan <file> [--width N] [--cache DIR]")?;
    Ok(Some(Options {
        path,
        width,
        cache_dir,
    }))
}
