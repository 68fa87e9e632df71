//! Task factory: zips independent item sources into posting tasks.
//!
//! Every produced task draws exactly one account, one title (unless titles
//! come from the content itself) and one content entry. Sources advance in
//! lock-step but cycle independently, so sources of different sizes drift
//! against each other. Tags, when configured, are a random-sized sample
//! from their own source.

use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use regex::Regex;
use tracing::{debug, warn};

use crate::config::secrets::SecretString;
use crate::error::{Error, Result};
use crate::model::WorkItem;
use crate::model::post::{Account, PostTask};
use crate::source::{ItemSource, Order};

/// Titles value that derives each title from the first line of its content.
pub const FIRST_LINE_TITLES: &str = "__use_first_line__";

pub const DEFAULT_TAGS_MEAN: f64 = 4.0;
pub const DEFAULT_TAGS_STD_DEV: f64 = 1.0;

static H1_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^<h1>([^<>]*)</h1>$").expect("valid h1 pattern"));

// ---------------------------------------------------------------------------
// Account formats
// ---------------------------------------------------------------------------

/// Layout of the accounts input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountFormat {
    /// Text lines `blog_url;username;password`.
    Wp0,
    /// CSV `email,email_password,blog_url,username,password`.
    WpApi0,
    /// CSV `email,email_password,username,password`.
    Ff0,
    /// CSV `email,email_password,username,password`.
    Li0,
    /// CSV `email,email_password,username,password`.
    Lj0,
}

impl AccountFormat {
    pub fn name(self) -> &'static str {
        match self {
            AccountFormat::Wp0 => "wp-0",
            AccountFormat::WpApi0 => "wpapi:0",
            AccountFormat::Ff0 => "ff:0",
            AccountFormat::Li0 => "li:0",
            AccountFormat::Lj0 => "lj-0",
        }
    }

    pub fn field_count(self) -> usize {
        match self {
            AccountFormat::Wp0 => 3,
            AccountFormat::WpApi0 => 5,
            AccountFormat::Ff0 | AccountFormat::Li0 | AccountFormat::Lj0 => 4,
        }
    }

    /// Load raw rows for this format: `;`-split text lines for `wp-0`,
    /// CSV rows for everything else.
    pub fn load_rows(self, path: &Path) -> Result<ItemSource<Vec<String>>> {
        match self {
            AccountFormat::Wp0 => {
                let lines = ItemSource::open(path)?;
                let name = lines.name().to_string();
                let rows = lines
                    .finite()
                    .map(|line| line.split(';').map(str::to_string).collect())
                    .collect();
                Ok(ItemSource::from_items(name, rows))
            }
            _ => ItemSource::open_table(path),
        }
    }

    /// Turn one raw row into an account. `row` is 1-based, for errors.
    pub fn parse_row(self, path: &Path, row: usize, fields: Vec<String>) -> Result<Account> {
        if fields.len() != self.field_count() {
            return Err(Error::MalformedRow {
                path: path.to_path_buf(),
                row,
                expected: self.field_count(),
                found: fields.len(),
            });
        }

        let (site_url, username, password) = match self {
            AccountFormat::Wp0 => (Some(fields[0].clone()), &fields[1], &fields[2]),
            AccountFormat::WpApi0 => (Some(fields[2].clone()), &fields[3], &fields[4]),
            AccountFormat::Ff0 | AccountFormat::Li0 | AccountFormat::Lj0 => {
                (None, &fields[2], &fields[3])
            }
        };

        let target = match self {
            AccountFormat::Wp0 | AccountFormat::WpApi0 => site_url.clone().unwrap_or_default(),
            AccountFormat::Ff0 => format!("ff:{username}"),
            AccountFormat::Li0 => format!("li:{username}"),
            AccountFormat::Lj0 => format!("lj:{username}"),
        };

        Ok(Account {
            site_url,
            username: username.clone(),
            password: SecretString::from(password.clone()),
            target,
            raw_row: fields,
        })
    }

    /// Load and validate every account. A single malformed row fails the
    /// whole load.
    pub fn load_accounts(self, path: &Path) -> Result<ItemSource<Account>> {
        let rows = self.load_rows(path)?;
        let name = rows.name().to_string();
        let accounts = rows
            .finite()
            .enumerate()
            .map(|(i, fields)| self.parse_row(path, i + 1, fields))
            .collect::<Result<Vec<_>>>()?;
        debug!(format = self.name(), count = accounts.len(), "accounts loaded");
        Ok(ItemSource::from_items(name, accounts))
    }
}

impl FromStr for AccountFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "wp-0" => Ok(AccountFormat::Wp0),
            "wpapi:0" => Ok(AccountFormat::WpApi0),
            "ff:0" => Ok(AccountFormat::Ff0),
            "li:0" => Ok(AccountFormat::Li0),
            "lj-0" => Ok(AccountFormat::Lj0),
            other => Err(Error::UnknownAccountFormat(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Title helpers
// ---------------------------------------------------------------------------

/// Unwrap a title written as `<h1>...</h1>`. An empty heading leaves the
/// title untouched.
pub fn clean_title(title: &str) -> &str {
    match H1_TITLE.captures(title).and_then(|c| c.get(1)) {
        Some(inner) if !inner.as_str().is_empty() => inner.as_str(),
        _ => title,
    }
}

/// Split an entry on its first line break into `(title, body)`. Returns
/// `None` unless both parts are non-empty after trimming.
pub fn split_title_and_body(entry: &str) -> Option<(String, String)> {
    let (title, body) = entry.trim_start().split_once('\n')?;
    let title = clean_title(title.trim_end());
    let body = body.trim_start();
    if title.is_empty() || body.is_empty() {
        return None;
    }
    Some((title.to_string(), body.to_string()))
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Draws a Gaussian-sized, de-duplicated tag list per task.
struct TagSampler {
    tags: Box<dyn Iterator<Item = String> + Send>,
    count: Normal<f64>,
}

impl TagSampler {
    fn sample(&mut self, rng: &mut StdRng) -> String {
        let draws = self.count.sample(rng).round().max(0.0) as usize;
        let mut chosen: Vec<String> = Vec::with_capacity(draws);
        for _ in 0..draws {
            let Some(tag) = self.tags.next() else { break };
            if !chosen.contains(&tag) {
                chosen.push(tag);
            }
        }
        chosen.join(", ")
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

enum Titles {
    None,
    Separate(Box<dyn Iterator<Item = String> + Send>),
    FirstLine,
}

/// Builder for a [`TaskFactory`].
pub struct TaskFactoryBuilder {
    accounts: ItemSource<Account>,
    content: ItemSource<String>,
    count: usize,
    titles: Option<ItemSource<String>>,
    first_line_titles: bool,
    tags: Option<(ItemSource<String>, f64, f64)>,
    order: Order,
    user_agent: Option<String>,
    seed: Option<u64>,
}

impl TaskFactoryBuilder {
    pub fn titles(mut self, titles: ItemSource<String>) -> Self {
        self.titles = Some(titles);
        self.first_line_titles = false;
        self
    }

    /// Derive each title from the first line of its content entry.
    pub fn first_line_titles(mut self) -> Self {
        self.titles = None;
        self.first_line_titles = true;
        self
    }

    pub fn tags(mut self, tags: ItemSource<String>, mean: f64, std_dev: f64) -> Self {
        self.tags = Some((tags, mean, std_dev));
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Fix the random seed (shuffles and tag counts become reproducible).
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<TaskFactory> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        ensure_not_empty(&self.accounts)?;
        ensure_not_empty(&self.content)?;

        let titles = if self.first_line_titles {
            let usable = self
                .content
                .items()
                .iter()
                .any(|entry| split_title_and_body(entry).is_some());
            if !usable {
                return Err(Error::NoUsableContent(self.content.name().to_string()));
            }
            Titles::FirstLine
        } else if let Some(titles) = self.titles {
            ensure_not_empty(&titles)?;
            Titles::Separate(titles.endless(self.order, StdRng::from_rng(&mut rng))?)
        } else {
            Titles::None
        };

        let tags = match self.tags {
            Some((source, mean, std_dev)) => {
                ensure_not_empty(&source)?;
                let count = Normal::new(mean, std_dev)
                    .map_err(|e| Error::Config(format!("bad tag count distribution: {e}")))?;
                Some(TagSampler {
                    tags: source.endless(self.order, StdRng::from_rng(&mut rng))?,
                    count,
                })
            }
            None => None,
        };

        let accounts = self.accounts.endless(self.order, StdRng::from_rng(&mut rng))?;
        let content = self.content.endless(self.order, StdRng::from_rng(&mut rng))?;

        Ok(TaskFactory {
            accounts,
            titles,
            content,
            tags,
            user_agent: self.user_agent,
            rng,
            count: self.count,
            produced: 0,
        })
    }
}

fn ensure_not_empty<T>(source: &ItemSource<T>) -> Result<()> {
    if source.is_empty() {
        return Err(Error::EmptySource(source.name().to_string()));
    }
    Ok(())
}

/// Lazy, finite sequence of `count` posting tasks.
pub struct TaskFactory {
    accounts: Box<dyn Iterator<Item = Account> + Send>,
    titles: Titles,
    content: Box<dyn Iterator<Item = String> + Send>,
    tags: Option<TagSampler>,
    user_agent: Option<String>,
    rng: StdRng,
    count: usize,
    produced: usize,
}

impl TaskFactory {
    pub fn builder(
        accounts: ItemSource<Account>,
        content: ItemSource<String>,
        count: usize,
    ) -> TaskFactoryBuilder {
        TaskFactoryBuilder {
            accounts,
            content,
            count,
            titles: None,
            first_line_titles: false,
            tags: None,
            order: Order::default(),
            user_agent: None,
            seed: None,
        }
    }

    /// Number of tasks this factory will produce in total.
    pub fn total(&self) -> usize {
        self.count
    }

    fn draw(&mut self) -> Option<PostTask> {
        let account = self.accounts.next()?;

        let (title, content) = match &mut self.titles {
            Titles::None => (None, self.content.next()?),
            Titles::Separate(titles) => (Some(titles.next()?), self.content.next()?),
            Titles::FirstLine => loop {
                let entry = self.content.next()?;
                if let Some((title, body)) = split_title_and_body(&entry) {
                    break (Some(title), body);
                }
            },
        };

        let tags = self.tags.as_mut().map(|sampler| sampler.sample(&mut self.rng));

        Some(PostTask {
            account,
            title,
            content,
            tags,
            user_agent: self.user_agent.clone(),
        })
    }
}

impl Iterator for TaskFactory {
    type Item = WorkItem<PostTask>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.produced >= self.count {
            return None;
        }
        match self.draw() {
            Some(task) => {
                let item = WorkItem::new(self.produced, task);
                self.produced += 1;
                Some(item)
            }
            None => {
                warn!(
                    produced = self.produced,
                    count = self.count,
                    "item source exhausted before task count was reached"
                );
                self.produced = self.count;
                None
            }
        }
    }

    // Sources can run dry early, so only the upper bound is exact.
    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.count - self.produced))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn accounts(names: &[&str]) -> ItemSource<Account> {
        let path = PathBuf::from("accounts");
        let accounts = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                AccountFormat::Lj0
                    .parse_row(&path, i + 1, strings(&["m@x", "mp", name, "pw"]))
                    .unwrap()
            })
            .collect();
        ItemSource::from_items("accounts", accounts)
    }

    #[test]
    fn account_format_round_trips_names() {
        for name in ["wp-0", "wpapi:0", "ff:0", "li:0", "lj-0"] {
            let format: AccountFormat = name.parse().unwrap();
            assert_eq!(format.name(), name);
        }
        assert!(matches!(
            "wp-9".parse::<AccountFormat>(),
            Err(Error::UnknownAccountFormat(s)) if s == "wp-9"
        ));
    }

    #[test]
    fn wp0_row_uses_blog_url_as_target() {
        let account = AccountFormat::Wp0
            .parse_row(
                Path::new("accs"),
                1,
                strings(&["https://blog.example/", "alice", "pw"]),
            )
            .unwrap();
        assert_eq!(account.target, "https://blog.example/");
        assert_eq!(account.username, "alice");
        assert_eq!(account.site_url.as_deref(), Some("https://blog.example/"));
    }

    #[test]
    fn csv_formats_label_targets_by_service() {
        let row = strings(&["m@x", "mp", "bob", "pw"]);
        let ff = AccountFormat::Ff0
            .parse_row(Path::new("a"), 1, row.clone())
            .unwrap();
        let li = AccountFormat::Li0
            .parse_row(Path::new("a"), 1, row.clone())
            .unwrap();
        let lj = AccountFormat::Lj0.parse_row(Path::new("a"), 1, row).unwrap();
        assert_eq!(ff.target, "ff:bob");
        assert_eq!(li.target, "li:bob");
        assert_eq!(lj.target, "lj:bob");
        assert!(lj.site_url.is_none());
    }

    #[test]
    fn wrong_field_count_is_malformed() {
        let err = AccountFormat::WpApi0
            .parse_row(Path::new("accs.csv"), 7, strings(&["a", "b", "c"]))
            .unwrap_err();
        match err {
            Error::MalformedRow {
                row,
                expected,
                found,
                ..
            } => {
                assert_eq!(row, 7);
                assert_eq!(expected, 5);
                assert_eq!(found, 3);
            }
            other => panic!("expected MalformedRow, got {other:?}"),
        }
    }

    #[test]
    fn load_accounts_rejects_any_malformed_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accs.txt");
        std::fs::write(&path, "https://a/;u;p\nhttps://b/;u\n").unwrap();

        let err = AccountFormat::Wp0.load_accounts(&path).unwrap_err();
        assert!(matches!(err, Error::MalformedRow { row: 2, .. }));
    }

    #[test]
    fn clean_title_unwraps_h1() {
        assert_eq!(clean_title("<h1>Big news</h1>"), "Big news");
        assert_eq!(clean_title("<h1></h1>"), "<h1></h1>");
        assert_eq!(clean_title("Plain"), "Plain");
        assert_eq!(clean_title("<h1>a <b>b</b></h1>"), "<h1>a <b>b</b></h1>");
    }

    #[test]
    fn split_requires_title_and_body() {
        assert_eq!(
            split_title_and_body("\n  <h1>Title</h1>  \n\n  Body text\nmore"),
            Some(("Title".to_string(), "Body text\nmore".to_string()))
        );
        assert_eq!(split_title_and_body("only one line"), None);
        assert_eq!(split_title_and_body("Title\n   "), None);
        assert_eq!(split_title_and_body("   \nBody"), None);
    }

    #[test]
    fn produces_exactly_count_tasks_in_lock_step() {
        let factory = TaskFactory::builder(
            accounts(&["alice", "bob"]),
            ItemSource::from_items("content", strings(&["c1", "c2", "c3"])),
            5,
        )
        .titles(ItemSource::from_items("titles", strings(&["t1", "t2", "t3", "t4"])))
        .order(Order::Sequential)
        .user_agent("Agent/1.0")
        .build()
        .unwrap();

        let tasks: Vec<_> = factory.collect();
        assert_eq!(tasks.len(), 5);

        let summary: Vec<(usize, String, String, String)> = tasks
            .iter()
            .map(|t| {
                (
                    t.index,
                    t.payload.account.username.clone(),
                    t.payload.title.clone().unwrap(),
                    t.payload.content.clone(),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, "alice".into(), "t1".into(), "c1".into()),
                (1, "bob".into(), "t2".into(), "c2".into()),
                (2, "alice".into(), "t3".into(), "c3".into()),
                (3, "bob".into(), "t4".into(), "c1".into()),
                (4, "alice".into(), "t1".into(), "c2".into()),
            ]
        );
        assert!(
            tasks
                .iter()
                .all(|t| t.payload.user_agent.as_deref() == Some("Agent/1.0"))
        );
        assert!(tasks.iter().all(|t| t.retries() == 0));
    }

    #[test]
    fn total_is_not_consumed_and_size_hint_tracks_remaining() {
        let mut factory = TaskFactory::builder(
            accounts(&["alice"]),
            ItemSource::from_items("content", strings(&["c1"])),
            3,
        )
        .build()
        .unwrap();

        assert_eq!(factory.total(), 3);
        assert_eq!(factory.size_hint(), (0, Some(3)));
        factory.next().unwrap();
        assert_eq!(factory.size_hint(), (0, Some(2)));
        assert_eq!(factory.total(), 3);
        assert_eq!(factory.by_ref().count(), 2);
        assert_eq!(factory.size_hint(), (0, Some(0)));
    }

    #[test]
    fn first_line_mode_skips_unsplittable_entries() {
        let factory = TaskFactory::builder(
            accounts(&["alice"]),
            ItemSource::from_items(
                "content",
                strings(&["no body here", "<h1>Title A</h1>\nBody A", "   ", "Title B\n\nBody B"]),
            ),
            3,
        )
        .first_line_titles()
        .order(Order::Sequential)
        .build()
        .unwrap();

        let pairs: Vec<(String, String)> = factory
            .map(|t| (t.payload.title.unwrap(), t.payload.content))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("Title A".to_string(), "Body A".to_string()),
                ("Title B".to_string(), "Body B".to_string()),
                ("Title A".to_string(), "Body A".to_string()),
            ]
        );
    }

    #[test]
    fn first_line_mode_without_any_usable_entry_is_rejected() {
        let result = TaskFactory::builder(
            accounts(&["alice"]),
            ItemSource::from_items("content", strings(&["single line", "another"])),
            1,
        )
        .first_line_titles()
        .build();
        assert!(matches!(result, Err(Error::NoUsableContent(_))));
    }

    #[test]
    fn empty_sources_are_rejected() {
        let result = TaskFactory::builder(
            ItemSource::from_items("accounts", vec![]),
            ItemSource::from_items("content", strings(&["c"])),
            1,
        )
        .build();
        assert!(matches!(result, Err(Error::EmptySource(name)) if name == "accounts"));
    }

    #[test]
    fn tags_are_sampled_deduplicated_and_joined() {
        let factory = TaskFactory::builder(
            accounts(&["alice"]),
            ItemSource::from_items("content", strings(&["c"])),
            2,
        )
        .tags(
            ItemSource::from_items("tags", strings(&["rust", "async", "tokio", "serde"])),
            2.0,
            0.0,
        )
        .order(Order::Sequential)
        .build()
        .unwrap();

        let tags: Vec<String> = factory.map(|t| t.payload.tags.unwrap()).collect();
        assert_eq!(tags, vec!["rust, async", "tokio, serde"]);
    }

    #[test]
    fn duplicate_tag_draws_collapse() {
        let mut factory = TaskFactory::builder(
            accounts(&["alice"]),
            ItemSource::from_items("content", strings(&["c"])),
            1,
        )
        .tags(ItemSource::from_items("tags", strings(&["only"])), 3.0, 0.0)
        .seed(9)
        .build()
        .unwrap();

        let task = factory.next().unwrap();
        assert_eq!(task.payload.tags.as_deref(), Some("only"));
        assert!(factory.next().is_none());
    }

    #[test]
    fn negative_tag_counts_floor_at_zero() {
        let mut factory = TaskFactory::builder(
            accounts(&["alice"]),
            ItemSource::from_items("content", strings(&["c"])),
            1,
        )
        .tags(ItemSource::from_items("tags", strings(&["a", "b"])), -5.0, 0.0)
        .build()
        .unwrap();

        assert_eq!(factory.next().unwrap().payload.tags.as_deref(), Some(""));
    }

    #[test]
    fn seeded_factories_are_reproducible() {
        let build = || {
            TaskFactory::builder(
                accounts(&["a", "b", "c", "d"]),
                ItemSource::from_items("content", strings(&["1", "2", "3", "4", "5"])),
                10,
            )
            .seed(1234)
            .build()
            .unwrap()
            .map(|t| (t.payload.account.username, t.payload.content))
            .collect::<Vec<_>>()
        };
        assert_eq!(build(), build());
    }
}
