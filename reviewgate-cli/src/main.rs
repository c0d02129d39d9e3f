mod client;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;

use client::{ClientError, ReviewClient};
use reviewgate_core::{
    ApproveRequest, AttachMediaRequest, ContentType, ItemId, ItemPage, ListFilter, LockHolder,
    LockToken, RejectRequest, StatusTab, Submission, WorkItem,
};

/// Reviewgate: work the shared content-review queue from the terminal
#[derive(Parser, Debug)]
#[command(name = "reviewgate")]
#[command(about = "Client for the review gate service", long_about = None)]
struct Cli {
    /// Base URL of the review gate service
    #[arg(long, env = "REVIEWGATE_URL", default_value = "http://localhost:3000", global = true)]
    server: String,

    /// Bearer token, if the service requires one
    #[arg(long, env = "REVIEWGATE_TOKEN", global = true)]
    token: Option<String>,

    /// Print raw JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List work items
    List(ListArgs),
    /// Show one work item with its audit trail
    Show(ItemArgs),
    /// Take (or refresh) the review lock on an item
    Lock(LockArgs),
    /// Release a review lock
    Unlock(UnlockArgs),
    /// Approve an item
    Approve(DecisionArgs),
    /// Reject an item with a reason
    Reject(RejectArgs),
    /// Attach the media artifact to a video under review
    AttachMedia(AttachMediaArgs),
    /// Submit a new item for review
    Submit(SubmitArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TabArg {
    Pending,
    Approved,
    Rejected,
    All,
}

impl From<TabArg> for StatusTab {
    fn from(tab: TabArg) -> Self {
        match tab {
            TabArg::Pending => StatusTab::Pending,
            TabArg::Approved => StatusTab::Approved,
            TabArg::Rejected => StatusTab::Rejected,
            TabArg::All => StatusTab::All,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ContentTypeArg {
    Video,
    PolicyDoc,
}

impl From<ContentTypeArg> for ContentType {
    fn from(content_type: ContentTypeArg) -> Self {
        match content_type {
            ContentTypeArg::Video => ContentType::Video,
            ContentTypeArg::PolicyDoc => ContentType::PolicyDoc,
        }
    }
}

#[derive(Parser, Debug)]
struct ListArgs {
    #[arg(long, value_enum, default_value = "pending")]
    tab: TabArg,

    /// Free-text filter over id, title and submitter
    #[arg(long)]
    query: Option<String>,

    #[arg(long, value_enum)]
    content_type: Option<ContentTypeArg>,

    #[arg(long, default_value_t = 0)]
    offset: usize,

    #[arg(long, default_value_t = reviewgate_core::api::DEFAULT_PAGE_LIMIT)]
    limit: usize,

    /// Item to keep selected, if it is still listed
    #[arg(long)]
    selected: Option<String>,
}

#[derive(Parser, Debug)]
struct ItemArgs {
    id: String,
}

#[derive(Parser, Debug)]
struct Reviewer {
    /// Reviewer id recorded as the lock owner and audit actor
    #[arg(long, env = "REVIEWGATE_REVIEWER_ID")]
    reviewer_id: String,

    /// Display name shown to other reviewers
    #[arg(long, env = "REVIEWGATE_REVIEWER_NAME")]
    reviewer_name: Option<String>,
}

impl Reviewer {
    fn holder(&self) -> LockHolder {
        let name = self
            .reviewer_name
            .clone()
            .unwrap_or_else(|| self.reviewer_id.clone());
        LockHolder::new(self.reviewer_id.clone(), name)
    }
}

#[derive(Parser, Debug)]
struct LockArgs {
    id: String,

    #[command(flatten)]
    reviewer: Reviewer,
}

#[derive(Parser, Debug)]
struct UnlockArgs {
    id: String,

    #[arg(long)]
    lock_token: String,
}

#[derive(Parser, Debug)]
struct DecisionArgs {
    id: String,

    /// Version the decision was made against (from `lock` or `show`)
    #[arg(long)]
    version: u64,

    #[arg(long)]
    lock_token: String,
}

#[derive(Parser, Debug)]
struct RejectArgs {
    #[command(flatten)]
    decision: DecisionArgs,

    #[arg(long)]
    reason: String,
}

#[derive(Parser, Debug)]
struct AttachMediaArgs {
    #[command(flatten)]
    decision: DecisionArgs,

    #[arg(long)]
    media_ref: String,
}

#[derive(Parser, Debug)]
struct SubmitArgs {
    #[arg(long)]
    id: String,

    #[arg(long)]
    title: String,

    #[arg(long, value_enum)]
    content_type: ContentTypeArg,

    #[arg(long)]
    submitted_by: String,

    #[arg(long)]
    media_ref: Option<String>,

    #[arg(long)]
    doc_ref: Option<String>,
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize response")?
    );
    Ok(())
}

fn print_item(item: &WorkItem) {
    println!("{} [{}] {}", item.id, item.content_type, item.title);
    println!(
        "  status: {}  version: {}  stage: {:?}",
        item.status, item.version, item.stage
    );
    println!("  submitted by: {}", item.submitted_by);
    if let Some(lock) = &item.lock {
        println!(
            "  locked by {} ({}) until {}",
            lock.owner_name, lock.owner_id, lock.expires_at
        );
    }
    if let Some(reason) = &item.reject_reason {
        println!("  reject reason: {}", reason);
    }
    if let Some(published_at) = item.published_at {
        println!("  published at {}", published_at);
    }
}

fn print_page(page: &ItemPage) {
    for item in &page.items {
        let marker = if page.selected.as_ref() == Some(&item.id) {
            ">"
        } else {
            " "
        };
        let lock = item
            .lock
            .as_ref()
            .map(|l| format!(" (locked by {})", l.owner_name))
            .unwrap_or_default();
        println!(
            "{} {:<24} v{:<3} {:<17} {}{}",
            marker,
            item.id.as_str(),
            item.version,
            item.status.as_str(),
            item.title,
            lock
        );
    }
    let info = &page.page_info;
    println!(
        "{}-{} of {}{}",
        if page.items.is_empty() { 0 } else { info.offset + 1 },
        info.offset + page.items.len(),
        info.total,
        if info.has_more { " (more)" } else { "" }
    );
}

/// Report a failed decision. Conflicts show the current state of the item so
/// the reviewer can decide again from fresh data; the decision itself is
/// never resubmitted.
async fn report_failure(client: &ReviewClient, id: &ItemId, err: ClientError) -> anyhow::Error {
    if let ClientError::Api(payload) = &err {
        eprintln!("{}", payload);
        if let Some(hint) = payload.code.hint() {
            eprintln!("hint: {}", hint);
        }
        if let Some(holder) = &payload.holder {
            eprintln!(
                "held by {} ({}) until {}",
                holder.owner_name, holder.owner_id, holder.expires_at
            );
        }
        if payload.code.requires_refetch() {
            let current = match &payload.current_snapshot {
                Some(snapshot) => Some(snapshot.clone()),
                None => client.get_item(id).await.ok(),
            };
            if let Some(current) = current {
                eprintln!("current state:");
                print_item(&current);
            }
        }
        return anyhow!("{} failed: {}", id, payload.code);
    }
    anyhow!(err)
}

async fn run(cli: Cli) -> Result<()> {
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .context("Failed to create HTTP client")?;
    let client = ReviewClient::new(http, &cli.server, cli.token)
        .with_context(|| format!("Invalid server URL {}", cli.server))?;

    match cli.command {
        Commands::List(args) => {
            let filter = ListFilter {
                tab: args.tab.into(),
                query: args.query,
                content_type: args.content_type.map(Into::into),
                offset: args.offset,
                limit: args.limit,
                selected: args.selected.map(ItemId::from),
            };
            let page = client.list(&filter).await?;
            if cli.json {
                print_json(&page)
            } else {
                print_page(&page);
                Ok(())
            }
        }
        Commands::Show(args) => {
            let item = client.get_item(&ItemId::from(args.id)).await?;
            if cli.json {
                return print_json(&item);
            }
            print_item(&item);
            println!("  audit:");
            for event in item.audit.sorted_for_display() {
                println!(
                    "    {} {:<15} {} {}",
                    event.at,
                    event.action.as_str(),
                    event.actor,
                    event.detail.unwrap_or_default()
                );
            }
            Ok(())
        }
        Commands::Lock(args) => {
            let id = ItemId::from(args.id);
            let grant = match client.acquire_lock(&id, &args.reviewer.holder()).await {
                Ok(grant) => grant,
                Err(err) => return Err(report_failure(&client, &id, err).await),
            };
            if cli.json {
                return print_json(&grant);
            }
            println!("lock token: {}", grant.lock_token.as_str());
            println!("version:    {}", grant.version);
            println!("expires at: {}", grant.expires_at);
            Ok(())
        }
        Commands::Unlock(args) => {
            let id = ItemId::from(args.id);
            let response = client
                .release_lock(&id, &LockToken::from(args.lock_token))
                .await?;
            if response.released {
                println!("released lock on {}", id);
            } else {
                println!("no lock on {} held with that token", id);
            }
            Ok(())
        }
        Commands::Approve(args) => {
            let id = ItemId::from(args.id);
            let body = ApproveRequest {
                version: args.version,
                lock_token: LockToken::from(args.lock_token),
            };
            match client.approve(&id, &body).await {
                Ok(item) if cli.json => print_json(&item),
                Ok(item) => {
                    print_item(&item);
                    Ok(())
                }
                Err(err) => Err(report_failure(&client, &id, err).await),
            }
        }
        Commands::Reject(args) => {
            let id = ItemId::from(args.decision.id);
            let body = RejectRequest {
                version: args.decision.version,
                lock_token: LockToken::from(args.decision.lock_token),
                reason: args.reason,
            };
            match client.reject(&id, &body).await {
                Ok(item) if cli.json => print_json(&item),
                Ok(item) => {
                    print_item(&item);
                    Ok(())
                }
                Err(err) => Err(report_failure(&client, &id, err).await),
            }
        }
        Commands::AttachMedia(args) => {
            let id = ItemId::from(args.decision.id);
            let body = AttachMediaRequest {
                version: args.decision.version,
                lock_token: LockToken::from(args.decision.lock_token),
                media_ref: args.media_ref,
            };
            match client.attach_media(&id, &body).await {
                Ok(item) if cli.json => print_json(&item),
                Ok(item) => {
                    print_item(&item);
                    Ok(())
                }
                Err(err) => Err(report_failure(&client, &id, err).await),
            }
        }
        Commands::Submit(args) => {
            let submission = Submission {
                id: ItemId::from(args.id),
                title: args.title,
                content_type: args.content_type.into(),
                submitted_by: args.submitted_by,
                media_ref: args.media_ref,
                doc_ref: args.doc_ref,
            };
            let item = client.submit(&submission).await?;
            if cli.json {
                print_json(&item)
            } else {
                print_item(&item);
                Ok(())
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::WARN)
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_reject_args_parse() {
        let cli = Cli::try_parse_from([
            "reviewgate",
            "reject",
            "d1",
            "--version",
            "2",
            "--lock-token",
            "lk_abc",
            "--reason",
            "off-brand",
        ])
        .unwrap();
        match cli.command {
            Commands::Reject(args) => {
                assert_eq!(args.decision.id, "d1");
                assert_eq!(args.decision.version, 2);
                assert_eq!(args.reason, "off-brand");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_reviewer_name_defaults_to_id() {
        let reviewer = Reviewer {
            reviewer_id: "rev-a".to_string(),
            reviewer_name: None,
        };
        assert_eq!(reviewer.holder(), LockHolder::new("rev-a", "rev-a"));
    }

    #[test]
    fn test_list_defaults() {
        let cli = Cli::try_parse_from(["reviewgate", "list", "--content-type", "policy-doc"]).unwrap();
        match cli.command {
            Commands::List(args) => {
                assert!(matches!(args.tab, TabArg::Pending));
                assert!(matches!(args.content_type, Some(ContentTypeArg::PolicyDoc)));
                assert_eq!(args.limit, 25);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
