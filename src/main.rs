use anyhow::{Context as _, bail};
use clap::Parser;
use musicstream::backend::MediaBackend;
use musicstream::{Config, Context, StreamData, check_stream_validity, download_stream};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "musicstream",
    about = "Resolve pages, radio streams and video links into playable audio",
    long_about = "Finds the audio streams behind a web page, podcast episode, radio stream or video link.\n\
    Streams can be validated, played through mpv or downloaded.\n\n\
    Examples:\n\
      musicstream https://example.com/podcast/episode1        # List streams\n\
      musicstream --download https://youtu.be/VIDEO_ID         # Download as mp3\n\
      musicstream --streams http://host/live.mp3 --play       # Play a radio stream\n\
      musicstream --validate http://host/live.aac             # Check a stream"
)]
struct Args {
    /// Page, stream or video URL to resolve
    reference: Option<String>,

    /// Use these stream URLs instead of resolving a reference
    #[arg(short = 's', long = "streams", num_args = 1..)]
    streams: Vec<String>,

    /// Title to use when the stream does not advertise one
    #[arg(short = 't', long = "title")]
    title: Option<String>,

    /// Index of the stream to use as default
    #[arg(short = 'n', long = "index")]
    index: Option<usize>,

    /// Download the default stream
    #[arg(short = 'd', long = "download")]
    download: bool,

    /// Only try the default stream when downloading
    #[arg(long = "only-default", requires = "download")]
    only_default: bool,

    /// Output file name (without extension)
    #[arg(short = 'o', long = "output")]
    output_name: Option<String>,

    /// Download directory
    #[arg(long = "dir")]
    output_dir: Option<PathBuf>,

    /// Play the default stream until it ends or Ctrl-C
    #[arg(short = 'p', long = "play")]
    play: bool,

    /// Start playback at this many seconds
    #[arg(long = "start", default_value_t = 0.0)]
    start: f64,

    /// Repeat the stream while playing
    #[arg(long = "loop")]
    looping: bool,

    /// Only check whether this stream URL is playable
    #[arg(long = "validate")]
    validate: Option<String>,

    /// JSON configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
}

fn format_duration(seconds: u64) -> String {
    let minutes = seconds / 60;
    let secs = seconds % 60;
    format!("{}:{:02}", minutes, secs)
}

fn display_stream_data(data: &StreamData) {
    println!("Title: {}", data.title.as_deref().unwrap_or("Unknown"));
    if let Some(artist) = &data.artist {
        println!("Artist: {}", artist);
    }
    if let Some(album) = &data.album {
        println!("Album: {}", album);
    }
    if let Some(duration) = data.duration {
        println!("Duration: {}", format_duration(duration));
    }
    println!("Source: {:?}", data.kind);
    println!();

    let bitrates = data.stream_bitrates();
    for (index, candidate) in data.candidates().iter().enumerate() {
        let marker = if index == data.default_index() { "*" } else { " " };
        print!("{}[{}] {}", marker, index, candidate.url);
        if let Some(kbps) = bitrates.as_ref().and_then(|b| b.get(index)) {
            print!("  ({} kbps)", kbps / 1000);
        }
        if candidate.is_playlist() {
            print!("  (playlist)");
        }
        println!();
    }
}

fn backend(config: &Config) -> Arc<dyn MediaBackend> {
    #[cfg(all(feature = "mpv", unix))]
    {
        Arc::new(musicstream::backend::mpv::MpvBackend::new(config.mpv_path.clone()))
    }
    #[cfg(not(all(feature = "mpv", unix)))]
    {
        let _ = config;
        Arc::new(musicstream::backend::Unavailable)
    }
}

#[cfg(all(feature = "mpv", unix))]
async fn play(ctx: &Context, data: &StreamData, start: f64, looping: bool) -> anyhow::Result<()> {
    use musicstream::{Audio, PlaybackController};
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::time::Duration;

    let last_second = Arc::new(AtomicI64::new(-1));
    let callback_second = last_second.clone();
    let mut controller = PlaybackController::for_stream_data(ctx, data)
        .context("no stream to play")?
        .with_elapsed_callback(Arc::new(move |time: f64, position: f64| {
            let second = time as i64;
            if callback_second.swap(second, Ordering::Relaxed) != second {
                eprint!(
                    "\r{} ({:.1}%)   ",
                    format_duration(second.max(0) as u64),
                    position * 100.0
                );
            }
        }));

    controller.play(start).await?;
    if looping {
        controller.set_loop(true).await?;
    }
    println!("Playing: {}", controller.url());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(Duration::from_millis(500)) => {
                if !controller.is_active() && controller.state() == musicstream::PlaybackState::Playing {
                    break;
                }
            }
        }
    }
    controller.stop();
    eprintln!();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("musicstream=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(dir) = &args.output_dir {
        config.download_dir = dir.clone();
    }
    let ctx = Context::new(config.clone(), backend(&config))?;

    if let Some(url) = &args.validate {
        let validity = check_stream_validity(&ctx, url).await;
        println!(
            "{}: {} (state: {:?})",
            url,
            if validity.valid { "valid" } else { "invalid" },
            validity.state
        );
        if !validity.valid {
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut data = if !args.streams.is_empty() {
        StreamData::from_streams(&ctx, args.streams.clone(), args.title.as_deref()).await
    } else if let Some(reference) = &args.reference {
        println!("Resolving: {}", reference);
        StreamData::resolve(&ctx, reference).await
    } else {
        bail!("a reference or --streams is required");
    };

    if data.is_empty() {
        match &data.resolution_error {
            Some(reason) => eprintln!("No stream found: {}", reason),
            None => eprintln!("No stream found."),
        }
        std::process::exit(1);
    }

    if let Some(index) = args.index {
        data.set_default_stream(index)?;
    }

    display_stream_data(&data);

    if args.download {
        println!();
        match download_stream(&ctx, &data, args.output_name.as_deref(), args.only_default).await? {
            Some(path) => println!("✓ Saved to: {}", path.display()),
            None => {
                eprintln!("✗ No downloadable stream");
                std::process::exit(1);
            }
        }
    }

    if args.play {
        #[cfg(all(feature = "mpv", unix))]
        play(&ctx, &data, args.start, args.looping).await?;
        #[cfg(not(all(feature = "mpv", unix)))]
        bail!("playback needs the mpv feature on a unix system");
    }

    Ok(())
}
