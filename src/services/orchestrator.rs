use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;

use crate::configuration::Settings;
use crate::domain::contact::CompanyInfo;

use super::email_body::render_email_body;
use super::letter::LetterGenerator;
use super::mailer::{Attachment, Mailer};
use super::pdf::letter_pdf;
use super::send_tracker::SendTracker;
use super::site_prober::SiteProber;
use super::RunError;

const PLACEHOLDER_COMPANY: &str = "[NOM_ENTREPRISE]";

#[derive(Debug, Clone)]
pub struct OutreachTask {
    pub email: String,
    pub company: String,
    pub info: CompanyInfo,
}

/// Counters reported after an outreach run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OutreachReport {
    pub rows_processed: u64,
    pub emails_found: u64,
    pub emails_sent: u64,
    pub emails_skipped: u64,
}

#[derive(Debug, Clone)]
pub struct OutreachOptions {
    pub dry_run: bool,
    pub workers: usize,
    pub cache_letters: bool,
}

struct SharedState {
    tracker: SendTracker,
    cache: HashMap<String, String>,
    claimed_emails: HashSet<String>,
    claimed_companies: HashSet<String>,
    api_calls: u32,
    sent: u64,
    skipped: u64,
}

/// Drives one outreach run over a normalized contact file: dedup against the
/// send-log, generate a letter per company category, and submit each e-mail
/// with its attachments.
pub struct OutreachOrchestrator {
    settings: Settings,
    options: OutreachOptions,
    generator: LetterGenerator,
    prober: SiteProber,
    mailer: Mailer,
    shared: Mutex<SharedState>,
}

impl OutreachOrchestrator {
    pub fn new(settings: Settings, options: OutreachOptions) -> Self {
        let generator = LetterGenerator::new(&settings.api, &settings.candidate);
        let prober = SiteProber::new(&settings.crawler);
        let mailer = Mailer::new(&settings.email);
        let tracker = SendTracker::new(&settings.tracker.log_path);

        OutreachOrchestrator {
            settings,
            options,
            generator,
            prober,
            mailer,
            shared: Mutex::new(SharedState {
                tracker,
                cache: HashMap::new(),
                claimed_emails: HashSet::new(),
                claimed_companies: HashSet::new(),
                api_calls: 0,
                sent: 0,
                skipped: 0,
            }),
        }
    }

    pub async fn run(self: Arc<Self>, input: &Path) -> Result<OutreachReport, RunError> {
        let loaded = load_tasks(input)?;

        let cv_path = Path::new(&self.settings.candidate.cv_path);
        if !cv_path.exists() {
            log::warn!(
                "CV {} does not exist. E-mails will go out without this attachment.",
                cv_path.display()
            );
        }

        let worker_count = self.options.workers.min(loaded.tasks.len()).max(1);

        match worker_count <= 1 {
            true => {
                for task in loaded.tasks {
                    self.process_task(task).await;
                }
            }
            false => {
                log::info!("Running with {} workers", worker_count);
                let queue = Arc::new(Mutex::new(VecDeque::from(loaded.tasks)));

                let mut handles = vec![];
                for _ in 0..worker_count {
                    let orchestrator = self.clone();
                    let queue = queue.clone();
                    handles.push(tokio::spawn(async move {
                        loop {
                            let task = { queue.lock().await.pop_front() };
                            match task {
                                Some(task) => orchestrator.process_task(task).await,
                                None => break,
                            }
                        }
                    }));
                }

                for handle in handles {
                    if let Err(e) = handle.await {
                        log::error!("Worker task failed: {:?}", e);
                    }
                }
            }
        }

        let shared = self.shared.lock().await;
        Ok(OutreachReport {
            rows_processed: loaded.rows_processed,
            emails_found: loaded.emails_found,
            emails_sent: shared.sent,
            emails_skipped: shared.skipped,
        })
    }

    async fn process_task(&self, task: OutreachTask) {
        let email_key = task.email.to_lowercase();
        let company_key = task.company.to_lowercase();

        // Claim both keys in one critical section so concurrent workers
        // cannot double-send to the same address or company. A claim is only
        // recorded durably once the e-mail actually goes out.
        let needs_api_pause = {
            let mut shared = self.shared.lock().await;

            let already_claimed = shared.claimed_emails.contains(&email_key)
                || (!company_key.is_empty() && shared.claimed_companies.contains(&company_key));
            if already_claimed || shared.tracker.has_been_sent(&task.email, &task.company) {
                log::info!(
                    "E-mail already sent to {} ({}) - skipping",
                    task.company,
                    task.email
                );
                shared.skipped += 1;
                return;
            }

            shared.claimed_emails.insert(email_key.clone());
            if !company_key.is_empty() {
                shared.claimed_companies.insert(company_key);
            }

            let cached = self
                .cache_key(&task)
                .map(|key| shared.cache.contains_key(&key))
                .unwrap_or(false);

            match cached {
                true => false,
                false => {
                    shared.api_calls += 1;
                    match shared.api_calls >= self.settings.outreach.api_calls_limit {
                        true => {
                            shared.api_calls = 0;
                            true
                        }
                        false => false,
                    }
                }
            }
        };

        if needs_api_pause {
            log::info!(
                "API call limit reached. Pausing for {} seconds...",
                self.settings.outreach.api_calls_pause_secs
            );
            tokio::time::sleep(Duration::from_secs(self.settings.outreach.api_calls_pause_secs))
                .await;
        }

        let letter = self.acquire_letter(&task).await;

        let subject = format!(
            "Candidature pour un stage en développement - {} - {}",
            self.settings.candidate.name, task.company
        );

        match self.options.dry_run {
            true => {
                log::info!("[TEST MODE] Simulated e-mail to {}", task.email);
                // Dry runs still land in the send-log so repeated rehearsals
                // do not re-target the same companies.
                let mut shared = self.shared.lock().await;
                shared.tracker.record_sent(&task.email, &task.company);
                shared.sent += 1;
            }
            false => {
                let delay_secs = {
                    let mut rng = rand::thread_rng();
                    rng.gen_range(
                        self.settings.email.delay_min_secs..=self.settings.email.delay_max_secs,
                    )
                };
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;

                match self.send_email(&task, &subject, &letter).await {
                    true => {
                        let mut shared = self.shared.lock().await;
                        shared.tracker.record_sent(&task.email, &task.company);
                        shared.sent += 1;
                    }
                    false => {
                        let mut shared = self.shared.lock().await;
                        shared.skipped += 1;
                    }
                }
            }
        }
    }

    fn cache_key(&self, task: &OutreachTask) -> Option<String> {
        match self.options.cache_letters && !task.info.category.is_empty() {
            true => Some(task.info.category.clone()),
            false => None,
        }
    }

    async fn acquire_letter(&self, task: &OutreachTask) -> String {
        let cache_key = self.cache_key(task);

        if let Some(key) = &cache_key {
            let cached = { self.shared.lock().await.cache.get(key).cloned() };
            if let Some(template) = cached {
                log::info!("Reusing the cached letter for category {}", key);
                return personalize_letter(&template, &task.company);
            }
        }

        let letter = self.generator.generate(&task.info, &self.prober).await;

        if let Some(key) = cache_key {
            let template = letter_template(&letter, &task.company);
            self.shared.lock().await.cache.insert(key, template);
        }

        letter
    }

    async fn send_email(&self, task: &OutreachTask, subject: &str, letter: &str) -> bool {
        let html_body = render_email_body(&task.company, &task.info.category);

        let mut attachments = vec![];

        match letter_pdf("Lettre de motivation", letter) {
            Ok(bytes) => {
                let filename = format!(
                    "Lettre_Motivation_{}.pdf",
                    self.settings.candidate.name.replace(' ', "_")
                );
                attachments.push(Attachment { filename, bytes });
                log::info!("Cover letter attached for {}", task.email);
            }
            Err(e) => log::error!("Failed to build the cover letter PDF: {}", e),
        }

        let cv_path = Path::new(&self.settings.candidate.cv_path);
        match cv_path.exists() {
            false => log::warn!(
                "CV {} does not exist. Sending without this attachment.",
                cv_path.display()
            ),
            true => match std::fs::read(cv_path) {
                Ok(bytes) => {
                    let filename = cv_path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| "cv.pdf".to_string());
                    attachments.push(Attachment { filename, bytes });
                    log::info!("CV {} attached for {}", cv_path.display(), task.email);
                }
                Err(e) => log::error!("Failed to read the CV {}: {}", cv_path.display(), e),
            },
        }

        match self
            .mailer
            .send(&task.email, subject, &html_body, &attachments)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to send to {}: {:?}", task.email, e);
                false
            }
        }
    }
}

/// Turns a generated letter into a category-level template by masking the
/// company name.
fn letter_template(letter: &str, company: &str) -> String {
    match company.is_empty() {
        true => letter.to_string(),
        false => letter.replace(company, PLACEHOLDER_COMPANY),
    }
}

fn personalize_letter(template: &str, company: &str) -> String {
    template.replace(PLACEHOLDER_COMPANY, company)
}

struct LoadedTasks {
    tasks: Vec<OutreachTask>,
    rows_processed: u64,
    emails_found: u64,
}

fn load_tasks(input: &Path) -> Result<LoadedTasks, RunError> {
    if !input.exists() {
        return Err(RunError::InputNotFound(input.to_path_buf()));
    }

    let mut reader = csv::Reader::from_path(input)?;

    let mut tasks = vec![];
    let mut rows_processed = 0;
    let mut emails_found = 0;

    for row in reader.deserialize::<HashMap<String, String>>() {
        let row = row?;
        rows_processed += 1;

        let email = row.get("email").map(String::as_str).unwrap_or("");
        if email.is_empty() || !email.contains('@') {
            log::warn!("No valid e-mail found at row {}", rows_processed);
            continue;
        }

        let email = email.trim().to_string();
        if email.to_lowercase().contains("sentry") {
            log::info!("E-mail {} ignored (contains 'sentry')", email);
            continue;
        }

        emails_found += 1;

        let field = |name: &str| row.get(name).cloned().unwrap_or_default();
        let info = CompanyInfo {
            title: field("title"),
            category: field("category"),
            city: field("city"),
            country: field("country"),
            website: field("website"),
            phone: field("phone"),
        };

        let company = info.title.clone();
        log::info!("Preparing {} ({})", company, email);

        tasks.push(OutreachTask {
            email,
            company,
            info,
        });
    }

    Ok(LoadedTasks {
        tasks,
        rows_processed,
        emails_found,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::{
        ApiSettings, CandidateSettings, CrawlerSettings, EmailSettings, OutreachSettings,
        TrackerSettings,
    };
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}-{}.csv", name, uuid::Uuid::new_v4()))
    }

    fn test_settings(tracker_path: &Path) -> Settings {
        Settings {
            candidate: CandidateSettings {
                name: "Elijah Lasserre".to_string(),
                signature: "\n\nCordialement,\nElijah Lasserre\n".to_string(),
                cv_path: "missing_cv.pdf".to_string(),
            },
            crawler: CrawlerSettings {
                max_depth: 1,
                max_pages: 1,
                delay_ms: 0,
                timeout_secs: 1,
                user_agent: "Mozilla/5.0 (compatible; test)".to_string(),
            },
            email: EmailSettings {
                smtp_server: "127.0.0.1".to_string(),
                smtp_port: 2525,
                sender: "elijah@exemple.fr".to_string(),
                password: String::new(),
                delay_min_secs: 0,
                delay_max_secs: 0,
            },
            // Nothing listens here, so every generation falls back to the
            // canned letter without waiting.
            api: ApiSettings {
                base_url: "http://127.0.0.1:9".to_string(),
                api_key: "test-key".to_string(),
                model: "mistral-large-latest".to_string(),
                max_retries: 1,
                backoff_factor: 1.0,
                rate_limit_pause_secs: 0.0,
                request_timeout_secs: 1,
            },
            outreach: OutreachSettings {
                api_calls_limit: 10,
                api_calls_pause_secs: 0,
            },
            tracker: TrackerSettings {
                log_path: tracker_path.to_string_lossy().to_string(),
            },
        }
    }

    fn dry_run_options(workers: usize) -> OutreachOptions {
        OutreachOptions {
            dry_run: true,
            workers,
            cache_letters: true,
        }
    }

    #[test]
    fn load_tasks_filters_rows_without_usable_email() {
        let input = temp_path("outreach-load");
        let csv_content = "\
email,title,category,city,country,website,phone
contact@alpha.fr,Alpha,Conseil,Lyon,France,,
,Beta,Conseil,Paris,France,,
abc@ingest.sentry.io,Gamma,Conseil,Nice,France,,
pas-un-email,Delta,Conseil,Nantes,France,,
";
        fs::write(&input, csv_content).unwrap();

        let loaded = load_tasks(&input).unwrap();

        assert_eq!(loaded.rows_processed, 4);
        assert_eq!(loaded.emails_found, 1);
        assert_eq!(loaded.tasks.len(), 1);
        assert_eq!(loaded.tasks[0].company, "Alpha");

        fs::remove_file(&input).ok();
    }

    #[test]
    fn letter_templates_swap_the_company_both_ways() {
        let letter = "Candidature au sein de Alpha. Alpha recrute.";

        let template = letter_template(letter, "Alpha");
        assert_eq!(
            template,
            "Candidature au sein de [NOM_ENTREPRISE]. [NOM_ENTREPRISE] recrute."
        );

        assert_eq!(
            personalize_letter(&template, "Beta"),
            "Candidature au sein de Beta. Beta recrute."
        );

        assert_eq!(letter_template(letter, ""), letter);
    }

    #[tokio::test]
    async fn dry_run_records_sends_and_skips_duplicates() {
        let input = temp_path("outreach-dry");
        let tracker_path = temp_path("outreach-dry-log");
        let csv_content = "\
email,title,category,city,country,website,phone
contact@alpha.fr,Alpha,Conseil,Lyon,France,,
CONTACT@ALPHA.FR,Alpha Bis,Conseil,Lyon,France,,
direction@beta.fr,Beta,Industrie,Paris,France,,
";
        fs::write(&input, csv_content).unwrap();

        let orchestrator = Arc::new(OutreachOrchestrator::new(
            test_settings(&tracker_path),
            dry_run_options(1),
        ));
        let report = orchestrator.run(Path::new(&input)).await.unwrap();

        assert_eq!(report.rows_processed, 3);
        assert_eq!(report.emails_found, 3);
        assert_eq!(report.emails_sent, 2);
        assert_eq!(report.emails_skipped, 1);

        let log_content = fs::read_to_string(&tracker_path).unwrap();
        assert_eq!(log_content.trim().lines().count(), 3);

        fs::remove_file(&input).ok();
        fs::remove_file(&tracker_path).ok();
    }

    #[tokio::test]
    async fn second_run_skips_everything_already_in_the_log() {
        let input = temp_path("outreach-rerun");
        let tracker_path = temp_path("outreach-rerun-log");
        let csv_content = "\
email,title,category,city,country,website,phone
contact@alpha.fr,Alpha,Conseil,Lyon,France,,
";
        fs::write(&input, csv_content).unwrap();

        let first = Arc::new(OutreachOrchestrator::new(
            test_settings(&tracker_path),
            dry_run_options(1),
        ));
        let first_report = first.run(Path::new(&input)).await.unwrap();
        assert_eq!(first_report.emails_sent, 1);

        let second = Arc::new(OutreachOrchestrator::new(
            test_settings(&tracker_path),
            dry_run_options(1),
        ));
        let second_report = second.run(Path::new(&input)).await.unwrap();
        assert_eq!(second_report.emails_sent, 0);
        assert_eq!(second_report.emails_skipped, 1);

        let log_content = fs::read_to_string(&tracker_path).unwrap();
        assert_eq!(log_content.trim().lines().count(), 2);

        fs::remove_file(&input).ok();
        fs::remove_file(&tracker_path).ok();
    }

    #[tokio::test]
    async fn worker_pool_drains_every_task() {
        let input = temp_path("outreach-pool");
        let tracker_path = temp_path("outreach-pool-log");
        let csv_content = "\
email,title,category,city,country,website,phone
contact@alpha.fr,Alpha,Conseil,Lyon,France,,
direction@beta.fr,Beta,Industrie,Paris,France,,
bonjour@gamma.fr,Gamma,Artisanat,Nice,France,,
";
        fs::write(&input, csv_content).unwrap();

        let orchestrator = Arc::new(OutreachOrchestrator::new(
            test_settings(&tracker_path),
            dry_run_options(3),
        ));
        let report = orchestrator.run(Path::new(&input)).await.unwrap();

        assert_eq!(report.emails_sent, 3);
        assert_eq!(report.emails_skipped, 0);

        fs::remove_file(&input).ok();
        fs::remove_file(&tracker_path).ok();
    }
}
