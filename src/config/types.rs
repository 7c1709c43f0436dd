use serde::Deserialize;

/// Main configuration structure for Sumi-Harvest
///
/// Every section has defaults, so an empty file (or no file at all) gives a
/// working configuration for the default listing site.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub fetch: FetchConfig,
    pub watchdog: WatchdogConfig,
    pub output: OutputConfig,
    pub extractor: ExtractorConfig,
}

/// Crawl loop configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Listing URL prefix; the page number is appended to it
    pub base_url: String,

    /// Last listing page to visit (inclusive)
    pub max_pages: u32,

    /// Stop once this many records have been collected
    pub limit: usize,

    /// Maximum listing pages in flight; 2 or more enables prefetching the next page
    pub page_workers: usize,

    /// Maximum detail fetches in flight
    pub detail_workers: usize,

    /// Save a checkpoint every time this many records have been collected
    pub checkpoint_interval: usize,

    /// Pause after each listing page (milliseconds)
    pub page_pause_ms: u64,

    /// Wall-clock ceiling for one run (seconds)
    pub runtime_budget_secs: u64,

    /// Delay before resuming after a watchdog restart (seconds)
    pub restart_grace_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.mastersportal.com/search/master/united-states?page=".to_string(),
            max_pages: 1980,
            limit: 40_000,
            page_workers: 1,
            detail_workers: 25,
            checkpoint_interval: 20,
            page_pause_ms: 5_000,
            runtime_budget_secs: 60_000,
            restart_grace_secs: 5,
        }
    }
}

/// Fetch policy and renderer configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FetchConfig {
    /// Total attempts per fetch, including the first
    pub max_attempts: u32,

    /// Bounds of the randomized delay between attempts (milliseconds)
    pub retry_delay_min_ms: u64,
    pub retry_delay_max_ms: u64,

    /// Bounds of the randomized settle delay after a listing page renders (milliseconds)
    pub page_settle_min_ms: u64,
    pub page_settle_max_ms: u64,

    /// Bounds of the randomized settle delay after a detail page renders (milliseconds)
    pub detail_settle_min_ms: u64,
    pub detail_settle_max_ms: u64,

    /// Readiness wait for listing pages (seconds)
    pub page_timeout_secs: u64,

    /// Readiness wait for detail pages (seconds)
    pub detail_timeout_secs: u64,

    /// User agent sent with every request
    pub user_agent: String,

    /// Marker identifying a site error page; such pages are never retried
    pub error_marker: String,

    /// Marker identifying an empty listing page; logged as a warning
    pub no_results_marker: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_min_ms: 1_000,
            retry_delay_max_ms: 2_000,
            page_settle_min_ms: 2_000,
            page_settle_max_ms: 4_000,
            detail_settle_min_ms: 500,
            detail_settle_max_ms: 2_000,
            page_timeout_secs: 20,
            detail_timeout_secs: 10,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
            error_marker: "<title>Error".to_string(),
            no_results_marker: "No results found".to_string(),
        }
    }
}

/// Resource watchdog configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WatchdogConfig {
    /// Whether the background watchdog runs at all
    pub enabled: bool,

    /// CPU usage (percent) at or above which the host counts as overloaded
    pub threshold_percent: f32,

    /// Consecutive overloaded samples that trigger a forced restart
    pub sustain_samples: u32,

    /// Time between samples (milliseconds)
    pub sample_interval_ms: u64,

    /// Pause applied after a page when load is above the threshold (milliseconds)
    pub backpressure_pause_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_percent: 99.0,
            sustain_samples: 15,
            sample_interval_ms: 1_000,
            backpressure_pause_ms: 6_000,
        }
    }
}

/// Output file locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Checkpoint data file (all collected records)
    pub data_path: String,

    /// Checkpoint state file (page cursor and record count)
    pub state_path: String,

    /// Restart marker written before a watchdog restart
    pub marker_path: String,

    /// Final export written when a run finishes
    pub final_path: String,

    /// SQLite run ledger; empty disables it
    pub database_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_path: "harvest_progress.json".to_string(),
            state_path: "harvest_state.json".to_string(),
            marker_path: "restart_flag.txt".to_string(),
            final_path: "harvest_final.json".to_string(),
            database_path: "harvest_runs.db".to_string(),
        }
    }
}

/// CSS selectors driving listing and detail extraction
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExtractorConfig {
    /// Selects listing titles; the link is taken from the title or its nearest `<a>` ancestor
    pub title_selector: String,

    /// Selects the owning entity of each listing, paired with titles in document order
    pub parent_selector: String,

    /// Detail fields, in output order
    pub fields: Vec<FieldRule>,
}

/// One field extracted from a detail page
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldRule {
    /// Output column name
    pub name: String,

    /// Selector for the element(s) holding the value
    pub selector: String,

    /// How matched elements become a value
    #[serde(flatten)]
    pub kind: FieldKind,
}

/// Extraction strategies for detail fields
///
/// Every kind has an empty default: a missing element yields `""` or `[]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FieldKind {
    /// Trimmed text of the first match
    Text,

    /// Trimmed text of every match
    List,

    /// First element matching `selector` that follows the heading whose text is `heading`
    AfterHeading { heading: String },

    /// Every element matching `selector` inside the first list following the heading
    ListAfterHeading {
        heading: String,
        #[serde(default = "default_list_selector")]
        container: String,
    },

    /// Decoded query parameter `param` of the first matching link's href
    LinkParam { param: String },

    /// First two matches joined as "low - high", followed by `suffix`
    Range {
        #[serde(default)]
        suffix: String,
    },

    /// One map per match: `label` text plus every `values` text inside it
    Grouped {
        label: String,
        values: String,
        label_key: String,
        values_key: String,
    },
}

fn default_list_selector() -> String {
    "ul".to_string()
}

impl FieldRule {
    fn new(name: &str, selector: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            selector: selector.to_string(),
            kind,
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        use FieldKind::*;

        Self {
            title_selector: "h2.StudyName".to_string(),
            parent_selector: "strong.OrganisationName".to_string(),
            fields: vec![
                FieldRule::new("About", "p", AfterHeading { heading: "About".to_string() }),
                FieldRule::new("Degree Tags", "span.Tag.js-tag", List),
                FieldRule::new("Tuition Fee", "div.TuitionFeeContainer span.Title", Text),
                FieldRule::new(
                    "Program Website",
                    "a.StudyLink.TextLink.TrackingExternalLink.ProgrammeWebsiteLink",
                    LinkParam { param: "target".to_string() },
                ),
                FieldRule::new("Duration", "span.js-duration", Text),
                FieldRule::new("Ranking", "span.Value", Text),
                FieldRule::new("Location", "span.Location", Text),
                FieldRule::new(
                    "Program Type",
                    "div.FactItemInformation.FactListTitle.js-durationFact",
                    Text,
                ),
                FieldRule::new(
                    "Start Dates and Deadlines",
                    "#js-StartdateContainer li.StartDateItem",
                    Grouped {
                        label: "div.FactItemInformation.StartDateItemTime.js-deadlineFact"
                            .to_string(),
                        values: "li.ApplicationDeadline div.FactItemInformation.Deadline"
                            .to_string(),
                        label_key: "Start Date".to_string(),
                        values_key: "Deadlines".to_string(),
                    },
                ),
                FieldRule::new(
                    "Program Structure",
                    "li",
                    ListAfterHeading {
                        heading: "Programme Structure".to_string(),
                        container: default_list_selector(),
                    },
                ),
                FieldRule::new("GPA", "div.GPACard.js-CardGPA div.Score span", Text),
                FieldRule::new("IELTS", "div.IELTSCard.js-CardIELTS div.Score span", Text),
                FieldRule::new("TOEFL", "div.TOEFLCard.js-CardTOEFL div.Score span", Text),
                FieldRule::new("Other Requirements", "article#OtherRequirements li", List),
                FieldRule::new(
                    "Cost of Living",
                    "section#CostOfLivingContainer span.Amount",
                    Range { suffix: " USD/month".to_string() },
                ),
                FieldRule::new("Disciplines", "article.FactItem.Disciplines a.TextOnly", List),
            ],
        }
    }
}
