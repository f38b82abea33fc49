mod cli;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use bmedit::config::{self, model::BookmarkKind, model::BookmarkRecord, model::Settings};
use bmedit::editor::{BookmarkEditor, CommitOutcome, EditorOptions, EditorServices, SessionSeed};
use bmedit::progress::UploadProgressBar;
use bmedit::services::http_resolver::HttpLinkResolver;
use bmedit::services::local_upload::LocalUploadService;
use bmedit::services::{CommitBookmark, SelectedFile};
use bmedit::store::{BookmarkStore, CreateBookmark, UpdateBookmark};
use cli::{Cli, Commands, Labels};

/// Route tracing to stderr. `BMEDIT_LOG` overrides the level chosen by `--verbose`.
fn init_logging(verbose: bool) {
    let fallback = if verbose { "bmedit=debug" } else { "bmedit=warn" };
    let filter =
        EnvFilter::try_from_env("BMEDIT_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Settings plus the store they point at.
struct Workspace {
    settings: Settings,
    store: Arc<BookmarkStore>,
}

fn open_workspace(config_path: Option<&str>) -> Result<Workspace> {
    let settings = config::load_with_override(config_path).context("Failed to load settings")?;
    let data_dir = settings.resolved_data_dir()?;
    let store = BookmarkStore::open(&data_dir)
        .with_context(|| format!("Failed to open bookmark store at {}", data_dir.display()))?;
    Ok(Workspace {
        settings,
        store: Arc::new(store),
    })
}

fn editor_services(
    ctx: &Workspace,
    persistence: Arc<dyn CommitBookmark>,
) -> Result<EditorServices> {
    Ok(EditorServices {
        resolver: Arc::new(HttpLinkResolver::from_settings(&ctx.settings)?),
        uploads: Arc::new(LocalUploadService::new(Arc::clone(&ctx.store))),
        files: ctx.store.clone(),
        persistence,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Link {
            url,
            channel,
            labels,
            no_preview,
        } => cmd_link(config_path, &url, channel, labels, no_preview).await?,
        Commands::File {
            path,
            channel,
            labels,
        } => cmd_file(config_path, &path, channel, labels).await?,
        Commands::Edit {
            id,
            link,
            file,
            labels,
            reset_name,
            no_preview,
        } => {
            cmd_edit(
                config_path,
                &id,
                link,
                file,
                labels,
                reset_name,
                no_preview,
            )
            .await?
        }
        Commands::List { channel } => cmd_list(config_path, channel.as_deref())?,
        Commands::Show { id } => cmd_show(config_path, &id)?,
        Commands::Completions { shell } => cmd_completions(shell),
    }

    Ok(())
}

fn apply_labels(editor: &mut BookmarkEditor, labels: &Labels) {
    if let Some(name) = &labels.name {
        editor.set_display_name(name);
    }
    if let Some(emoji) = &labels.emoji {
        editor.set_emoji(emoji);
    }
}

/// Create a link bookmark.
async fn cmd_link(
    config_path: Option<&str>,
    url: &str,
    channel: String,
    labels: Labels,
    no_preview: bool,
) -> Result<()> {
    let ctx = open_workspace(config_path)?;
    let mut options = EditorOptions::from_settings(&ctx.settings, &channel);
    options.link_previews &= !no_preview;

    let persistence = Arc::new(CreateBookmark {
        store: Arc::clone(&ctx.store),
        channel_id: channel,
    });
    let mut editor = BookmarkEditor::open(
        SessionSeed::create(BookmarkKind::Link),
        options,
        editor_services(&ctx, persistence)?,
    );

    apply_labels(&mut editor, &labels);
    editor.on_link_paste(url);
    settle(&mut editor, None).await?;
    save(&mut editor).await
}

/// Upload a file and create a file bookmark.
async fn cmd_file(
    config_path: Option<&str>,
    path: &Path,
    channel: String,
    labels: Labels,
) -> Result<()> {
    let ctx = open_workspace(config_path)?;
    let file = SelectedFile::from_path(path).await?;
    let progress = UploadProgressBar::new(&file.name, file.size);

    let options = EditorOptions::from_settings(&ctx.settings, &channel);
    let persistence = Arc::new(CreateBookmark {
        store: Arc::clone(&ctx.store),
        channel_id: channel,
    });
    let mut editor = BookmarkEditor::open(
        SessionSeed::create(BookmarkKind::File).with_file(file),
        options,
        editor_services(&ctx, persistence)?,
    );

    apply_labels(&mut editor, &labels);
    settle(&mut editor, Some(progress)).await?;
    save(&mut editor).await
}

/// Edit an existing bookmark.
async fn cmd_edit(
    config_path: Option<&str>,
    id: &str,
    link: Option<String>,
    file: Option<PathBuf>,
    labels: Labels,
    reset_name: bool,
    no_preview: bool,
) -> Result<()> {
    let ctx = open_workspace(config_path)?;
    let Some(original) = ctx.store.get(id) else {
        bail!("No bookmark with id '{}'. Run `bmedit list` to see ids.", id);
    };

    if link.is_some() && original.kind != BookmarkKind::Link {
        bail!("Bookmark '{}' is a file bookmark; use --file", id);
    }
    if file.is_some() && original.kind != BookmarkKind::File {
        bail!("Bookmark '{}' is a link bookmark; use --link", id);
    }

    let mut seed = SessionSeed::edit(original.clone());
    let mut progress = None;
    if let Some(path) = file {
        let selected = SelectedFile::from_path(&path).await?;
        progress = Some(UploadProgressBar::new(&selected.name, selected.size));
        seed = seed.with_file(selected);
    }

    let mut options = EditorOptions::from_settings(&ctx.settings, &original.channel_id);
    options.link_previews &= !no_preview;
    let persistence = Arc::new(UpdateBookmark {
        store: Arc::clone(&ctx.store),
        bookmark_id: original.id.clone(),
    });
    let mut editor = BookmarkEditor::open(seed, options, editor_services(&ctx, persistence)?);

    if reset_name {
        editor.clear_display_name();
    }
    apply_labels(&mut editor, &labels);
    if let Some(link) = link {
        editor.on_link_paste(&link);
    }

    settle(&mut editor, progress).await?;
    save(&mut editor).await
}

/// Drive the session until previews and uploads have settled.
async fn settle(
    editor: &mut BookmarkEditor,
    mut progress: Option<UploadProgressBar>,
) -> Result<()> {
    while editor.process_next().await {
        if let Some(bar) = progress.as_mut()
            && let Some(pending) = &editor.state().pending_upload
        {
            bar.observe(pending.progress);
        }
    }

    let state = editor.state();
    if let Some(bar) = progress.as_mut() {
        if state.file_error.is_empty() {
            bar.finish();
        } else {
            bar.abandon();
        }
    }

    if !state.file_error.is_empty() {
        bail!("{}", state.file_error);
    }
    if !state.link_error.is_empty() {
        bail!("{}: {}", state.link_error, state.committed_link);
    }
    Ok(())
}

async fn save(editor: &mut BookmarkEditor) -> Result<()> {
    if !editor.confirm_enabled() {
        if !editor.is_valid() {
            bail!("Bookmark is incomplete; nothing was saved");
        }
        bail!("No changes to save");
    }

    let name = editor.display_name();
    debug!(%name, "confirming bookmark");
    match editor.confirm().await {
        CommitOutcome::Saved => {
            println!("Saved bookmark '{name}'");
            Ok(())
        }
        CommitOutcome::Failed | CommitOutcome::Rejected => {
            bail!("{}", editor.state().save_error)
        }
        CommitOutcome::Disabled => bail!("No changes to save"),
    }
}

/// Print the bookmark table.
fn cmd_list(config_path: Option<&str>, channel: Option<&str>) -> Result<()> {
    let ctx = open_workspace(config_path)?;
    let bookmarks = ctx.store.list(channel);

    if bookmarks.is_empty() {
        if channel.is_some() {
            println!("No bookmarks in that channel.");
        } else {
            println!("No bookmarks yet. Add one with:");
            println!("  bmedit link <url> --channel <channel>");
        }
        return Ok(());
    }

    println!(
        "  {:<36} {:<16} {:<5} {:<28} TARGET",
        "ID", "CHANNEL", "TYPE", "NAME"
    );
    println!("  {}", "-".repeat(100));
    for b in &bookmarks {
        println!(
            "  {:<36} {:<16} {:<5} {:<28} {}",
            b.id,
            b.channel_id,
            b.kind,
            b.display_name,
            target(&ctx.store, b)
        );
    }
    Ok(())
}

fn target(store: &BookmarkStore, b: &BookmarkRecord) -> String {
    match b.kind {
        BookmarkKind::Link => b.link_url.clone().unwrap_or_default(),
        BookmarkKind::File => b
            .file_id
            .as_deref()
            .and_then(|id| store.file(id))
            .map(|f| f.name)
            .unwrap_or_else(|| "(missing file)".to_string()),
    }
}

fn cmd_show(config_path: Option<&str>, id: &str) -> Result<()> {
    let ctx = open_workspace(config_path)?;
    let Some(b) = ctx.store.get(id) else {
        bail!("No bookmark with id '{}'", id);
    };

    println!("id:        {}", b.id);
    println!("channel:   {}", b.channel_id);
    println!("type:      {}", b.kind);
    println!("name:      {}", b.display_name);
    if !b.emoji.is_empty() {
        println!("emoji:     {}", b.emoji);
    }
    println!("target:    {}", target(&ctx.store, &b));
    if let Some(image) = &b.image_url {
        println!("icon:      {image}");
    }
    if let Some(file) = b.file_id.as_deref().and_then(|id| ctx.store.file(id)) {
        println!(
            "file:      {} ({})",
            ctx.store.files_dir().join(&file.id).join(&file.name).display(),
            bmedit::progress::format_bytes(file.size)
        );
    }
    println!("created:   {}", b.create_at.to_rfc3339());
    println!("updated:   {}", b.update_at.to_rfc3339());
    Ok(())
}

fn cmd_completions(shell: clap_complete::Shell) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "bmedit", &mut io::stdout());
}
