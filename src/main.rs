use clap::error::ErrorKind;
use clap::Parser;
use tokio::io::AsyncWriteExt;
use tracing::info;

use ytdlpp::cli::progress::{finish_progress_line, progress_renderer};
use ytdlpp::cli::table::render_format_table;
use ytdlpp::cli::Args;
use ytdlpp::select::select_streams;
use ytdlpp::youtube::SearchQuery;
use ytdlpp::{
    AudioStreamOptions, AudioStreamer, DownloadOptions, Downloader, Error, Extractor, Result,
    VideoInfo,
};

#[tokio::main]
async fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            std::process::exit(code);
        }
    };

    ytdlpp::common::logger::init(args.quiet, args.verbose);

    match run(args).await {
        Ok(()) => {}
        Err(e) => {
            eprintln!("ERROR: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let Some(url) = args.url.clone() else {
        return Err(Error::InvalidUrl(
            "no URL given; see --help for usage".into(),
        ));
    };

    let extractor = Extractor::new()?;

    if let Some(query) = SearchQuery::parse(&url) {
        let query = query?;
        return run_search(&extractor, &query, &args).await;
    }

    let info = extractor.extract(&url).await?;
    if args.dump_json {
        println!("{}", info.to_json());
        return Ok(());
    }
    run_video_action(&extractor, &info, &args).await
}

async fn run_search(extractor: &Extractor, query: &SearchQuery, args: &Args) -> Result<()> {
    info!("[youtube] Searching for: {}", query.query);
    let results = extractor.search(query).await?;
    if results.is_empty() {
        return Err(Error::VideoNotFound(format!(
            "no results for '{}'",
            query.query
        )));
    }

    if args.flat_playlist {
        if args.dump_json {
            let entries: Vec<_> = results.iter().map(|r| r.to_json()).collect();
            println!("{}", serde_json::Value::Array(entries));
        } else {
            for r in &results {
                println!("{}  {}", r.video_id, r.title);
            }
        }
        return Ok(());
    }

    if args.dump_json {
        let mut entries = Vec::with_capacity(results.len());
        for r in &results {
            let info = extractor.extract(&r.watch_url()).await?;
            entries.push(info.to_json());
        }
        println!("{}", serde_json::Value::Array(entries));
        return Ok(());
    }

    for r in &results {
        let info = extractor.extract(&r.watch_url()).await?;
        run_video_action(extractor, &info, args).await?;
    }
    Ok(())
}

async fn run_video_action(extractor: &Extractor, info: &VideoInfo, args: &Args) -> Result<()> {
    if args.list_formats {
        println!(
            "[info] Available formats for {}:\n{}",
            info.id,
            render_format_table(&info.formats)
        );
        return Ok(());
    }

    if args.get_url {
        let streams = select_streams(info, &args.format, args.audio_language.as_deref());
        if streams.is_empty() {
            return Err(Error::ExtractionFailed(format!(
                "requested format not available: {}",
                args.format
            )));
        }
        if let Some(video) = streams.video {
            println!("{}", video.url);
        }
        if let Some(audio) = streams.audio {
            if streams.video.map_or(true, |v| v.itag != audio.itag) {
                println!("{}", audio.url);
            }
        }
        return Ok(());
    }

    if args.stream_audio {
        return stream_audio_to_stdout(extractor, info, args).await;
    }

    if args.simulate {
        info!(
            "[youtube] {}: simulation, skipping download of \"{}\"",
            info.id, info.title
        );
        return Ok(());
    }

    // Fill the post-selection display fields used by output templates.
    let mut info = info.clone();
    {
        let streams = select_streams(&info, &args.format, args.audio_language.as_deref());
        let mut ids: Vec<String> = Vec::new();
        let mut resolution: Option<String> = None;
        if let Some(video) = streams.video {
            ids.push(video.itag.to_string());
            if video.width > 0 {
                resolution = Some(format!("{}x{}", video.width, video.height));
            }
        }
        if let Some(audio) = streams.audio {
            ids.push(audio.itag.to_string());
        }
        if let Some(resolution) = resolution {
            info.resolution = resolution;
        }
        info.format_id = ids.join("+");
    }

    let options = DownloadOptions {
        selector: args.format.clone(),
        merge_format: args.merge_output_format.clone(),
        output_template: args.output.clone(),
        output_dir: args.paths.clone(),
        preferred_language: args.audio_language.clone(),
    };

    let downloader = Downloader::new(extractor.http().clone());
    let progress = progress_renderer(args.quiet);
    let result = downloader.download(&info, &options, progress).await;
    finish_progress_line(args.quiet);

    let path = result?;
    info!("[download] Finished: {}", path.display());
    Ok(())
}

/// Decode the best audio track to raw PCM on stdout (s16le, 48 kHz, 2ch).
async fn stream_audio_to_stdout(
    extractor: &Extractor,
    info: &VideoInfo,
    args: &Args,
) -> Result<()> {
    let streams = select_streams(info, "bestaudio", args.audio_language.as_deref());
    let Some(audio) = streams.audio else {
        return Err(Error::ExtractionFailed(format!(
            "no audio-only stream available for {}",
            info.id
        )));
    };

    info!(
        "[youtube] {}: streaming itag {} as PCM",
        info.id, audio.itag
    );

    let streamer = AudioStreamer::new(extractor.http().clone());
    let stream = streamer.open(&audio.url, AudioStreamOptions::default())?;

    let mut stdout = tokio::io::stdout();
    loop {
        let chunk = stream.read_alloc().await?;
        if chunk.is_empty() {
            break;
        }
        stdout
            .write_all(&chunk)
            .await
            .map_err(|e| Error::Unknown(format!("stdout write failed: {e}")))?;
    }
    stdout
        .flush()
        .await
        .map_err(|e| Error::Unknown(format!("stdout flush failed: {e}")))?;
    Ok(())
}
