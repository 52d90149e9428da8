//! Trim and merge renders.

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use vidfeed_capture_engine::backend::default_backend;
use vidfeed_common::config::AppConfig;
use vidfeed_common::error::VidfeedResult;
use vidfeed_feed_model::feed::FeedPost;
use vidfeed_feed_model::generation::AspectRatio;
use vidfeed_feed_model::render::{RenderMode, RenderOutput, RenderSnapshot, RenderStatus};
use vidfeed_feed_store::{put_record, JsonFileStore};
use vidfeed_render_engine::{EditorSession, ProgressCallback, RenderOrchestrator};

/// Options shared by `trim` and `merge`.
pub struct RenderArgs {
    pub filter: String,
    pub output: Option<PathBuf>,
    pub post: Option<String>,
}

pub async fn trim(
    config: &AppConfig,
    uri: String,
    start: f64,
    end: Option<f64>,
    args: RenderArgs,
) -> anyhow::Result<()> {
    let mut session = open_session(config, &uri)?;
    let duration = session
        .probe()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to probe {uri}: {e}"))?;

    let end = end.unwrap_or(duration);
    if !session.trim_mut().set_start(start) || !session.trim_mut().set_end(end) {
        anyhow::bail!("Invalid trim window {start:.3}..{end:.3} for a {duration:.3}s source");
    }
    select_filter(&mut session, &args.filter);

    println!("Trimming: {uri}");
    println!("  Window: {start:.3}s .. {end:.3}s");
    println!("  Filter: {}", session.active_filter().name);

    run_render(config, &mut session, RenderMode::Trim, args).await
}

pub async fn merge(config: &AppConfig, uris: Vec<String>, args: RenderArgs) -> anyhow::Result<()> {
    let Some((first, rest)) = uris.split_first() else {
        anyhow::bail!("merge needs at least one source");
    };
    let mut session = open_session(config, first)?;
    for uri in rest {
        session.add_clip(uri.as_str(), display_name(uri));
    }
    session
        .probe()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to probe {first}: {e}"))?;
    select_filter(&mut session, &args.filter);

    println!("Merging {} clips:", session.sequencer().len());
    for clip in session.sequencer().clips() {
        match clip.duration_secs {
            Some(secs) => println!("  {} ({secs:.1}s)", clip.display_name),
            None => println!("  {} (duration unknown)", clip.display_name),
        }
    }
    println!("  Filter: {}", session.active_filter().name);

    run_render(config, &mut session, RenderMode::Merge, args).await
}

fn open_session(config: &AppConfig, uri: &str) -> anyhow::Result<EditorSession> {
    let orchestrator = RenderOrchestrator::new(default_backend(), config.render.clone())?;
    Ok(EditorSession::open(Arc::new(orchestrator), uri, display_name(uri)))
}

fn display_name(uri: &str) -> String {
    let trimmed = uri.split('?').next().unwrap_or(uri);
    Path::new(trimmed)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(trimmed)
        .to_string()
}

fn select_filter(session: &mut EditorSession, name: &str) {
    let selected = session.select_filter(name).name.clone();
    if fell_back(name, &selected) {
        tracing::warn!(requested = %name, "Unknown filter, using {selected}");
    }
}

/// Catalog lookups ignore case and surrounding whitespace.
fn fell_back(requested: &str, selected: &str) -> bool {
    !selected.eq_ignore_ascii_case(requested.trim())
}

async fn run_render(
    config: &AppConfig,
    session: &mut EditorSession,
    mode: RenderMode,
    args: RenderArgs,
) -> anyhow::Result<()> {
    let progress: ProgressCallback = Box::new(print_progress);
    let job = session.render_with_progress(mode, Some(progress))?;
    let output = wait_or_cancel(session.orchestrator(), job)
        .await
        .map_err(|e| anyhow::anyhow!("Render failed: {e}"))?;
    println!();

    let path = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("vidfeed-{mode:?}.{}", output.file_extension()).to_lowercase()));
    std::fs::write(&path, &output.bytes)?;
    println!(
        "Render complete: {} ({}x{}, {:.2}s, {} bytes)",
        path.display(),
        output.width,
        output.height,
        output.duration_secs,
        output.bytes.len()
    );

    if let Some(caption) = args.post {
        let id = record_post(config, caption, &path, &output)?;
        println!("Saved feed post {id}");
    }
    Ok(())
}

/// Await the job, cancelling it on Ctrl-C.
async fn wait_or_cancel(
    orchestrator: &Arc<RenderOrchestrator>,
    job: impl Future<Output = VidfeedResult<RenderOutput>> + Send + 'static,
) -> VidfeedResult<RenderOutput> {
    let mut handle = tokio::spawn(job);
    tokio::select! {
        joined = &mut handle => joined.map_err(anyhow::Error::from)?,
        _ = tokio::signal::ctrl_c() => {
            println!("\nCancelling...");
            orchestrator.cancel();
            handle.await.map_err(anyhow::Error::from)?
        }
    }
}

fn print_progress(snapshot: &RenderSnapshot) {
    if snapshot.status == RenderStatus::Running {
        print!("\r  Progress: {:.1}%  ", snapshot.progress_percent);
        let _ = std::io::stdout().flush();
    }
}

fn record_post(
    config: &AppConfig,
    caption: String,
    path: &Path,
    output: &RenderOutput,
) -> anyhow::Result<String> {
    let store = JsonFileStore::open(&config.store_dir)?;
    let aspect = if output.width > output.height {
        AspectRatio::Landscape
    } else {
        AspectRatio::Portrait
    };
    let resolution = format!("{}p", output.width.min(output.height));
    let mut post = FeedPost::pending(caption, "local-edit", aspect, resolution);
    let location = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    post.mark_ready(format!("file://{}", location.display()));
    put_record(&store, &post)?;
    Ok(post.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidfeed_editing_core::filters;

    #[test]
    fn case_variants_are_not_fallbacks() {
        for requested in ["noir", "NOIR", "Noir", " noir "] {
            let selected = &filters::get_or_identity(requested).name;
            assert!(!fell_back(requested, selected), "{requested}");
        }
    }

    #[test]
    fn unknown_names_are_fallbacks() {
        let selected = &filters::get_or_identity("sparkle").name;
        assert_eq!(selected, &filters::identity().name);
        assert!(fell_back("sparkle", selected));
        assert!(!fell_back("NONE", &filters::identity().name));
    }

    #[test]
    fn display_name_strips_query_and_dirs() {
        assert_eq!(display_name("synthetic://clip?duration=4"), "clip");
        assert_eq!(display_name("/videos/a.mp4"), "a.mp4");
    }
}
