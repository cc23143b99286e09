use anyhow::{Context, Result};
use ccm_style::github::{
    self, DEFAULT_BASE, DEFAULT_COMMENT, DEFAULT_TITLE, GitHubClient, Outcome, PrInputs,
};
use clap::Parser;

/// Inputs come from flags or from the `INPUT_*` variables GitHub Actions sets.
#[derive(Parser, Debug)]
#[command(
    name = "data-update-pr",
    version,
    about = "Comment on the open data-update pull request, or open one"
)]
struct Cli {
    /// GitHub token with pull-request write access.
    #[arg(long, env = "INPUT_TOKEN", hide_env_values = true)]
    token: String,
    /// Repository owner (defaults to the owner in GITHUB_REPOSITORY).
    #[arg(long, env = "INPUT_OWNER")]
    owner: Option<String>,
    /// Repository name (defaults to the repo in GITHUB_REPOSITORY).
    #[arg(long, env = "INPUT_REPO")]
    repo: Option<String>,
    /// Title prefix; " - YYYY-MM-DD" is appended.
    #[arg(long, env = "INPUT_TITLE")]
    title: Option<String>,
    #[arg(long, env = "INPUT_BASE")]
    base: Option<String>,
    /// "true" to comment on an existing PR.
    #[arg(long = "make-comment", env = "INPUT_MAKECOMMENT")]
    make_comment: Option<String>,
    #[arg(long, env = "INPUT_COMMENT")]
    comment: Option<String>,
    /// Branch the data pipeline pushed to.
    #[arg(long = "data-update-branch", env = "INPUT_DATAUPDATEBRANCH")]
    data_update_branch: String,
    #[arg(long, env = "GITHUB_REPOSITORY", hide = true)]
    github_repository: Option<String>,
    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com", hide = true)]
    api_url: String,
}

// Empty action inputs count as unset.
fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

fn inputs(cli: &Cli) -> Result<PrInputs> {
    let from_env = non_empty(cli.github_repository.clone()).and_then(|r| github::split_repository(&r));
    let owner = non_empty(cli.owner.clone())
        .or_else(|| from_env.as_ref().map(|(o, _)| o.clone()))
        .context("no owner given and GITHUB_REPOSITORY is not set")?;
    let repo = non_empty(cli.repo.clone())
        .or_else(|| from_env.as_ref().map(|(_, r)| r.clone()))
        .context("no repo given and GITHUB_REPOSITORY is not set")?;
    Ok(PrInputs {
        owner,
        repo,
        title: non_empty(cli.title.clone()).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        base: non_empty(cli.base.clone()).unwrap_or_else(|| DEFAULT_BASE.to_string()),
        make_comment: github::parse_flag(
            &non_empty(cli.make_comment.clone()).unwrap_or_else(|| "true".to_string()),
        ),
        comment: non_empty(cli.comment.clone()).unwrap_or_else(|| DEFAULT_COMMENT.to_string()),
        data_update_branch: cli.data_update_branch.clone(),
    })
}

fn run(cli: Cli) -> Result<Outcome> {
    let inputs = inputs(&cli)?;
    let client = GitHubClient::with_api_url(&cli.token, &cli.api_url)?;
    let today = chrono::Utc::now().date_naive();
    github::run(&inputs, &client, today)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(outcome) => log::debug!("{:?}", outcome),
        Err(e) => {
            // workflow command: marks the step as failed with this message
            println!("::error::{:#}", e);
            std::process::exit(1);
        }
    }
}
