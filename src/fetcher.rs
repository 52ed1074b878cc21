//! Content fetching for MTL Blog category pages.
//!
//! A [`Fetcher`] turns a [`Category`] into the [`Article`]s currently listed
//! on that category's page. [`BlogFetcher`] does this with one HTTP GET and a
//! pass over the returned HTML; nothing is cached between calls.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Client as ReqwestClient;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{FETCH_ARTICLES, FETCH_ERRORS, FETCH_REQUESTS};

/// Root of the public blog.
pub const DEFAULT_BLOG_URL: &str = "https://www.mtlblog.com";

/// Guards against hung sockets; category pages normally load in a second.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of words kept from each article body.
pub const DEFAULT_WORD_LIMIT: usize = 1000;

/// Navigation text that precedes the article content on every page.
const SITE_BANNER: &str = "Montreal | Laval | Québec City";

/// Teaser text that follows the article content on every page.
const READ_MORE_MARKER: &str = "Keep readingShow";

/// A section of the blog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    /// Local news.
    News,
    /// Restaurants and bars.
    EatDrink,
    /// Events and activities.
    ThingsToDo,
    /// Travel.
    Travel,
    /// Sports.
    Sports,
    /// Lifestyle.
    Lifestyle,
    /// Personal finance.
    Money,
    /// Deals and sales.
    Deals,
    /// Real estate.
    RealEstate,
}

impl Category {
    /// Every category, in menu order.
    pub const ALL: [Category; 9] = [
        Category::News,
        Category::EatDrink,
        Category::ThingsToDo,
        Category::Travel,
        Category::Sports,
        Category::Lifestyle,
        Category::Money,
        Category::Deals,
        Category::RealEstate,
    ];

    /// The URL path segment for this category.
    pub fn slug(&self) -> &'static str {
        match self {
            Category::News => "news",
            Category::EatDrink => "eat-drink",
            Category::ThingsToDo => "things-to-do",
            Category::Travel => "travel",
            Category::Sports => "sports",
            Category::Lifestyle => "lifestyle",
            Category::Money => "money",
            Category::Deals => "deals",
            Category::RealEstate => "real-estate",
        }
    }

    /// The human-readable name for this category.
    pub fn title(&self) -> &'static str {
        match self {
            Category::News => "News",
            Category::EatDrink => "Eat Drink",
            Category::ThingsToDo => "Things To Do",
            Category::Travel => "Travel",
            Category::Sports => "Sports",
            Category::Lifestyle => "Lifestyle",
            Category::Money => "Money",
            Category::Deals => "Deals",
            Category::RealEstate => "Real Estate",
        }
    }

    /// The listing page for this category under `base`.
    pub fn url(&self, base: &Url) -> Result<Url> {
        base.join(self.slug()).map_err(|e| {
            Error::fetch(
                format!("cannot build URL for category {}: {e}", self.slug()),
                Some(base.to_string()),
                Some(Box::new(e)),
            )
        })
    }

    /// A numbered list of categories, one per line, for menus.
    pub fn menu() -> String {
        Category::ALL
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}. {}", i + 1, c.title()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for Category {
    type Err = Error;

    /// Accepts a slug (`eat-drink`), a title (`Eat Drink`), or a 1-based menu
    /// number (`2`), case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        let input = s.trim();
        if let Ok(index) = input.parse::<usize>() {
            return index
                .checked_sub(1)
                .and_then(|i| Category::ALL.get(i).copied())
                .ok_or_else(|| {
                    Error::invalid_input(
                        format!("choose a category number between 1 and {}", Category::ALL.len()),
                        Some(input.to_string()),
                    )
                });
        }
        let normalized = input
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
            .to_lowercase();
        Category::ALL
            .iter()
            .find(|c| c.slug() == normalized)
            .copied()
            .ok_or_else(|| Error::invalid_input("unknown category", Some(input.to_string())))
    }
}

/// One blog post scraped from a category page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Article {
    /// The category page the article was listed on.
    pub category: Category,
    /// The headline.
    pub title: String,
    /// Cleaned article text.
    pub body: String,
    /// Absolute link to the article.
    pub url: String,
}

/// Source of articles for a category.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the articles currently listed for `category`.
    async fn fetch(&self, category: Category) -> Result<Vec<Article>>;
}

/// Fetches category listings from the blog over HTTP.
#[derive(Debug, Clone)]
pub struct BlogFetcher {
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
    word_limit: usize,
}

impl BlogFetcher {
    /// Create a fetcher for the public MTL Blog site.
    pub fn new() -> Result<Self> {
        Self::with_options(None, None)
    }

    /// Create a fetcher with custom settings.
    pub fn with_options(base_url: Option<&str>, timeout: Option<Duration>) -> Result<Self> {
        let mut base_url = Url::parse(base_url.unwrap_or(DEFAULT_BLOG_URL))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::config(format!("Failed to build HTTP client: {}", e), None)
            })?;

        Ok(Self {
            client,
            base_url,
            timeout,
            word_limit: DEFAULT_WORD_LIMIT,
        })
    }

    /// Set how many words of each article body are kept.
    pub fn with_word_limit(mut self, word_limit: usize) -> Self {
        self.word_limit = word_limit;
        self
    }

    /// The site root category pages are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn fetch_page(&self, url: &Url) -> Result<String> {
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!("request timed out after {:?}", self.timeout)
            } else {
                format!("request failed: {e}")
            };
            Error::fetch(message, Some(url.to_string()), Some(Box::new(e)))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(
                format!("HTTP {}", status.as_u16()),
                Some(url.to_string()),
                None,
            ));
        }

        response.text().await.map_err(|e| {
            Error::fetch(
                format!("failed to read page body: {e}"),
                Some(url.to_string()),
                Some(Box::new(e)),
            )
        })
    }
}

#[async_trait::async_trait]
impl Fetcher for BlogFetcher {
    async fn fetch(&self, category: Category) -> Result<Vec<Article>> {
        FETCH_REQUESTS.click();
        let url = category.url(&self.base_url)?;
        debug!(%url, "fetching category listing");

        let result = match self.fetch_page(&url).await {
            Ok(html) => parse_articles(category, &url, &html, self.word_limit),
            Err(err) => Err(err),
        };
        match &result {
            Ok(articles) => {
                FETCH_ARTICLES.count(articles.len() as u64);
                debug!(%url, articles = articles.len(), "parsed category listing");
            }
            Err(_) => FETCH_ERRORS.click(),
        }
        result
    }
}

struct Selectors {
    article: Selector,
    heading: Selector,
    link: Selector,
    paragraph: Selector,
}

impl Selectors {
    fn new() -> Result<Self> {
        Ok(Self {
            article: selector("article")?,
            heading: selector("h1, h2, h3, h4")?,
            link: selector("a[href]")?,
            paragraph: selector("p")?,
        })
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::config(format!("bad selector {css}: {e:?}"), None))
}

/// Extract the articles listed in a category page.
///
/// Each `<article>` element yields at most one [`Article`]; elements without a
/// title or link are skipped and repeated links keep their first occurrence.
/// A page with nothing extractable is reported as a fetch error because it
/// means the page layout changed.
pub fn parse_articles(
    category: Category,
    page_url: &Url,
    html: &str,
    word_limit: usize,
) -> Result<Vec<Article>> {
    let selectors = Selectors::new()?;
    let document = Html::parse_document(html);

    let mut articles: Vec<Article> = Vec::new();
    for element in document.select(&selectors.article) {
        let Some(article) = extract_article(category, page_url, element, &selectors, word_limit)
        else {
            continue;
        };
        if articles.iter().any(|a| a.url == article.url) {
            continue;
        }
        articles.push(article);
    }

    if articles.is_empty() {
        return Err(Error::fetch(
            "page structure no longer matches: no articles found",
            Some(page_url.to_string()),
            None,
        ));
    }
    Ok(articles)
}

fn extract_article(
    category: Category,
    page_url: &Url,
    element: ElementRef<'_>,
    selectors: &Selectors,
    word_limit: usize,
) -> Option<Article> {
    let link = element.select(&selectors.link).next()?;
    let url = page_url.join(link.value().attr("href")?).ok()?;

    let title = element
        .select(&selectors.heading)
        .map(|h| collapse_whitespace(&h.text().collect::<String>()))
        .find(|t| !t.is_empty())
        .unwrap_or_else(|| collapse_whitespace(&link.text().collect::<String>()));
    if title.is_empty() {
        return None;
    }

    let paragraphs = element
        .select(&selectors.paragraph)
        .map(|p| p.text().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ");
    let raw_body = if paragraphs.trim().is_empty() {
        element.text().collect::<Vec<_>>().join(" ")
    } else {
        paragraphs
    };

    Some(Article {
        category,
        title,
        body: clean_text(&raw_body, word_limit),
        url: url.to_string(),
    })
}

/// Reduce scraped page text to plain words.
///
/// Site chrome before the banner and after the read-more teaser is dropped,
/// every character other than ASCII letters, digits, and whitespace is
/// removed, whitespace is collapsed, and at most `word_limit` words are kept.
pub fn clean_text(raw: &str, word_limit: usize) -> String {
    let text = raw.split_once(SITE_BANNER).map_or(raw, |(_, rest)| rest);
    let text = text.rsplit_once(READ_MORE_MARKER).map_or(text, |(kept, _)| kept);
    let filtered: String = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    filtered
        .split_whitespace()
        .take(word_limit)
        .collect::<Vec<_>>()
        .join(" ")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
