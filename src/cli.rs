use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Channel bookmark editor with link previews and file uploads.
#[derive(Parser, Debug)]
#[command(name = "bmedit", version, about)]
pub struct Cli {
    /// Settings file (default: <config dir>/bmedit/config.toml).
    #[arg(long, global = true, env = "BMEDIT_CONFIG", value_name = "PATH")]
    pub config: Option<String>,

    /// Log debug output to stderr. BMEDIT_LOG takes precedence.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Title and emoji shared by every editing command.
#[derive(Args, Debug, Clone, Default)]
pub struct Labels {
    /// Display name. Defaults to the page title or file name.
    #[arg(short, long)]
    pub name: Option<String>,

    /// Emoji shortcode shown next to the name.
    #[arg(short, long)]
    pub emoji: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bookmark a link in a channel.
    Link {
        /// Address to bookmark; a bare domain is read as https://.
        url: String,

        /// Channel to add the bookmark to.
        #[arg(short, long)]
        channel: String,

        #[command(flatten)]
        labels: Labels,

        /// Do not fetch the page for a title and icon.
        #[arg(long)]
        no_preview: bool,
    },

    /// Upload a file and bookmark it in a channel.
    File {
        /// File to upload.
        path: PathBuf,

        /// Channel to add the bookmark to.
        #[arg(short, long)]
        channel: String,

        #[command(flatten)]
        labels: Labels,
    },

    /// Change an existing bookmark.
    Edit {
        /// Bookmark id (see `bmedit list`).
        id: String,

        /// New link (link bookmarks).
        #[arg(long, conflicts_with = "file")]
        link: Option<String>,

        /// Replacement file (file bookmarks).
        #[arg(long)]
        file: Option<PathBuf>,

        #[command(flatten)]
        labels: Labels,

        /// Drop the custom name and use the page title or file name.
        #[arg(long, conflicts_with = "name")]
        reset_name: bool,

        /// Do not fetch the page for a title and icon.
        #[arg(long)]
        no_preview: bool,
    },

    /// List bookmarks.
    List {
        /// Only bookmarks in this channel.
        #[arg(short, long)]
        channel: Option<String>,
    },

    /// Show one bookmark in full.
    Show {
        /// Bookmark id.
        id: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate for.
        shell: clap_complete::Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_link() {
        let cli = Cli::parse_from([
            "bmedit", "link", "example.com", "-c", "dev", "--name", "Example", "--no-preview",
        ]);
        match cli.command {
            Commands::Link {
                url,
                channel,
                labels,
                no_preview,
            } => {
                assert_eq!(url, "example.com");
                assert_eq!(channel, "dev");
                assert_eq!(labels.name.as_deref(), Some("Example"));
                assert!(no_preview);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_edit_rejects_link_and_file() {
        let result = Cli::try_parse_from([
            "bmedit", "edit", "b1", "--link", "a.example.com", "--file", "x.pdf",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["bmedit", "list", "--config", "/tmp/c.toml", "-v"]);
        assert_eq!(cli.config.as_deref(), Some("/tmp/c.toml"));
        assert!(cli.verbose);
    }
}
