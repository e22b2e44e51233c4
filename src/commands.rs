//! CLI subcommands and their handlers.
//!
//! Handlers print to the writer they are given and return an [`Outcome`];
//! only `main` decides how the process ends.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::feed::{validate_feed_url, FeedFetcher};
use crate::ingest::{parse_interval, CycleReport, Scheduler};
use crate::storage::{Database, DatabaseError, Feed, User};

/// Posts shown by `browse` when no limit is given.
pub const DEFAULT_BROWSE_LIMIT: i64 = 2;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Switch to an existing user
    Login { name: String },
    /// Create a user and log in as them
    Register { name: String },
    /// Delete every user, feed, follow and post
    Reset,
    /// List users, marking the current one
    Users,
    /// Collect feeds forever, one per interval (e.g. 30s, 1m, 1h30m)
    Agg { interval: String },
    /// Add a feed and follow it
    #[command(name = "addfeed")]
    AddFeed { name: String, url: String },
    /// List every feed and who added it
    Feeds,
    /// Follow an existing feed by URL
    Follow { url: String },
    /// List the feeds the current user follows
    Following,
    /// Stop following a feed by URL
    Unfollow { url: String },
    /// Show the newest posts from followed feeds
    Browse {
        #[arg(default_value_t = DEFAULT_BROWSE_LIMIT)]
        limit: i64,
    },
    /// Collect one feed right now
    Fetch { url: String },
}

/// How a handler wants the process to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Report success and exit 0
    Completed,
    /// Exit with this code without the success line
    Exit(u8),
}

/// Everything a handler may touch, built once in `main`.
pub struct AppContext {
    pub db: Database,
    pub config: Config,
    pub config_path: PathBuf,
    pub cancel: CancellationToken,
}

impl AppContext {
    /// The logged-in user, or an error telling the caller to log in.
    pub async fn current_user(&self) -> Result<User> {
        let Some(name) = self.config.current_user_name.as_deref() else {
            bail!("No user is logged in; run `gator login <name>` first");
        };
        self.db
            .get_user_by_name(name)
            .await
            .with_context(|| format!("Current user '{}' is not registered", name))
    }

    fn set_current_user(&mut self, name: &str) -> Result<()> {
        self.config.current_user_name = Some(name.to_string());
        self.config
            .save(&self.config_path)
            .with_context(|| format!("Failed to save {}", self.config_path.display()))
    }

    fn scheduler(&self) -> Result<Scheduler<Database>> {
        let fetcher = FeedFetcher::new(&self.config.user_agent, self.config.fetch_timeout())
            .context("Failed to build HTTP client")?;
        Ok(Scheduler::new(self.db.clone(), fetcher)
            .with_persistence_policy(self.config.persistence_policy()))
    }

    /// Look up a feed by the URL as typed; padding is stripped like `addfeed` does.
    async fn feed_by_url(&self, url: &str) -> Result<Feed> {
        let url = url.trim();
        self.db
            .get_feed_by_url(url)
            .await?
            .with_context(|| format!("No feed with URL {}", url))
    }
}

pub async fn execute(command: Command, ctx: &mut AppContext, out: &mut dyn Write) -> Result<Outcome> {
    tracing::debug!(?command, "Executing command");

    match command {
        Command::Login { name } => {
            let user = ctx.db.get_user_by_name(&name).await?;
            ctx.set_current_user(&user.name)?;
            writeln!(out, "Username set to: {}", user.name)?;
        }

        Command::Register { name } => {
            let user = match ctx.db.create_user(&name).await {
                Ok(user) => user,
                Err(DatabaseError::Conflict(_)) => {
                    writeln!(out, "User already exists: {}", name)?;
                    return Ok(Outcome::Exit(1));
                }
                Err(e) => return Err(e).context("Failed to register user"),
            };
            ctx.set_current_user(&user.name)?;
            writeln!(out, "User registered successfully:")?;
            writeln!(out, "User ID: {}", user.id)?;
            writeln!(out, "Created at: {}", user.created_at)?;
            writeln!(out, "User Name: {}", user.name)?;
        }

        Command::Reset => {
            ctx.db.reset().await.context("Failed to reset database")?;
            writeln!(out, "Database reset")?;
            return Ok(Outcome::Exit(0));
        }

        Command::Users => {
            let current = ctx.config.current_user_name.as_deref();
            for user in ctx.db.list_users().await? {
                if Some(user.name.as_str()) == current {
                    writeln!(out, "* {} (current)", user.name)?;
                } else {
                    writeln!(out, "* {}", user.name)?;
                }
            }
        }

        Command::Agg { interval } => {
            let interval = parse_interval(&interval)?;
            writeln!(
                out,
                "Collecting feeds every {}",
                humantime::format_duration(interval)
            )?;
            ctx.scheduler()?.run(interval, &ctx.cancel).await?;
        }

        Command::AddFeed { name, url } => {
            let user = ctx.current_user().await?;
            validate_feed_url(&url)?;
            let (feed, follow) = ctx.db.create_feed(user.id, &name, url.trim()).await?;
            writeln!(out, "ID: {}", feed.id)?;
            writeln!(out, "Created At: {}", feed.created_at)?;
            writeln!(out, "Name: {}", feed.name)?;
            writeln!(out, "URL: {}", feed.url)?;
            writeln!(out, "Followed by: {}", follow.user_name)?;
        }

        Command::Feeds => {
            for listing in ctx.db.list_feeds_with_creators().await? {
                writeln!(out, "Feed: {}", listing.name)?;
                writeln!(out, "URL: {}", listing.url)?;
                writeln!(out, "Posted By: {}", listing.creator_name)?;
                writeln!(out)?;
            }
        }

        Command::Follow { url } => {
            let user = ctx.current_user().await?;
            let feed = ctx.feed_by_url(&url).await?;
            let follow = ctx.db.create_feed_follow(user.id, feed.id).await?;
            writeln!(out, "New Follow successful:")?;
            writeln!(out, "Feed: {}", follow.feed_name)?;
            writeln!(out, "User: {}", follow.user_name)?;
        }

        Command::Following => {
            let user = ctx.current_user().await?;
            writeln!(out, "User {} Following:", user.name)?;
            for name in ctx.db.list_feed_follows(user.id).await? {
                writeln!(out, "{}", name)?;
            }
        }

        Command::Unfollow { url } => {
            let user = ctx.current_user().await?;
            let feed = ctx.feed_by_url(&url).await?;
            ctx.db.delete_feed_follow(user.id, feed.id).await?;
            writeln!(out, "Unfollowed {}", feed.name)?;
        }

        Command::Browse { limit } => {
            if limit < 1 {
                bail!("Limit must be at least 1, got {}", limit);
            }
            let user = ctx.current_user().await?;
            let posts = ctx.db.get_posts_for_user(user.id, limit).await?;
            for (i, post) in posts.iter().enumerate() {
                writeln!(out, "-- Post {}", i + 1)?;
                writeln!(out, "{}", post.title)?;
                writeln!(out, "{}", post.published_at)?;
                writeln!(out, "{}", post.description.as_deref().unwrap_or_default())?;
            }
        }

        Command::Fetch { url } => {
            let report = ctx
                .scheduler()?
                .scrape_feed_by_url(url.trim(), &ctx.cancel)
                .await?;
            print_report(out, &report)?;
        }
    }

    Ok(Outcome::Completed)
}

fn print_report(out: &mut dyn Write, report: &CycleReport) -> std::io::Result<()> {
    writeln!(out, "Feed: {} (HTTP {})", report.feed_name, report.http_status)?;
    writeln!(out, "Channel: {}", report.channel_title)?;
    writeln!(
        out,
        "New posts: {}, already stored: {}",
        report.inserted, report.duplicates
    )
}
