//! Background analysis of submitted applications.
//!
//! Submission hands the application id to an [`AnalysisQueue`]; a single
//! worker task pulls ids off a bounded channel, asks an [`Analyzer`] for an
//! assessment and writes the result (or the error) back onto the application.
//! Failures are also appended to the store's dead-letter table and counted.

use std::{
  future::Future,
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
};

use chrono::Utc;
use permit_core::{
  application::{AiAnalysis, ApplicationDetail},
  store::PermitStore,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

/// Primes the model before the application-specific prompt.
pub const SYSTEM_PROMPT: &str = "You are an expert in local government permitting. Analyze permit \
   applications thoroughly and provide actionable insights.";

// ─── Analyzer ────────────────────────────────────────────────────────────────

/// Everything an analyzer is told about one application.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
  pub application_id: Uuid,
  pub reference:      String,
  pub applicant:      String,
  pub council:        String,
  pub permit_type:    String,
  pub data:           Value,
}

impl AnalysisRequest {
  pub fn from_detail(detail: &ApplicationDetail) -> Self {
    Self {
      application_id: detail.application.id,
      reference:      detail.application.reference.clone(),
      applicant:      detail.user.full_name(),
      council:        detail.council.name.clone(),
      permit_type:    detail.permit_type.name.clone(),
      data:           detail.application.data.clone(),
    }
  }

  /// The user prompt sent alongside [`SYSTEM_PROMPT`].
  pub fn prompt(&self) -> String {
    let data = serde_json::to_string_pretty(&self.data).unwrap_or_else(|_| self.data.to_string());
    format!(
      "Analyze this permit application for {permit_type} with {council}:\n\n\
       Reference: {reference}\n\
       Applicant: {applicant}\n\
       Permit Type: {permit_type}\n\
       Council: {council}\n\n\
       Application Data:\n{data}\n\n\
       Please provide:\n\
       1. Completeness assessment (missing required fields)\n\
       2. Potential issues or concerns\n\
       3. Recommendations for improvement\n\
       4. Estimated processing time\n\
       5. Risk level (low/medium/high)\n",
      permit_type = self.permit_type,
      council = self.council,
      reference = self.reference,
      applicant = self.applicant,
    )
  }
}

#[derive(Debug, Error)]
pub enum AnalyzerError {
  #[error("request to analysis service failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("analysis service returned {status}: {body}")]
  Status { status: u16, body: String },

  #[error("analysis service returned no content")]
  Empty,
}

/// Produces a free-text assessment of an application.
pub trait Analyzer: Send + Sync + 'static {
  /// Recorded next to each completed analysis.
  fn model(&self) -> &str;

  fn analyze(
    &self,
    request: &AnalysisRequest,
  ) -> impl Future<Output = Result<String, AnalyzerError>> + Send;
}

// ─── Queue ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Counters {
  enqueued:  AtomicU64,
  completed: AtomicU64,
  failed:    AtomicU64,
  dropped:   AtomicU64,
  skipped:   AtomicU64,
}

/// A point-in-time copy of the queue counters, reported by `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStats {
  pub enabled:   bool,
  pub enqueued:  u64,
  pub completed: u64,
  pub failed:    u64,
  pub dropped:   u64,
  pub skipped:   u64,
}

/// Why a job could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
  #[error("analysis queue is full")]
  Full,
  #[error("analysis worker has stopped")]
  Closed,
}

/// Handle for scheduling analyses. Cheap to clone; the worker stops once
/// every handle is dropped.
#[derive(Clone)]
pub struct AnalysisQueue {
  tx:       Option<mpsc::Sender<Uuid>>,
  counters: Arc<Counters>,
}

impl AnalysisQueue {
  /// A queue with no worker: every job is skipped.
  pub fn disabled() -> Self { Self { tx: None, counters: Arc::default() } }

  /// Spawn the worker and return a handle to feed it.
  pub fn start<S, A>(store: Arc<S>, analyzer: A, capacity: usize) -> (Self, JoinHandle<()>)
  where
    S: PermitStore + 'static,
    A: Analyzer,
  {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let counters = Arc::new(Counters::default());
    let worker = tokio::spawn(run(store, analyzer, rx, counters.clone()));
    (Self { tx: Some(tx), counters }, worker)
  }

  pub fn is_enabled(&self) -> bool { self.tx.is_some() }

  /// Schedule `application_id` without waiting. A disabled queue accepts and
  /// skips the job.
  pub fn enqueue(&self, application_id: Uuid) -> Result<(), EnqueueError> {
    let Some(tx) = &self.tx else {
      tracing::debug!(%application_id, "analysis disabled; skipping");
      self.counters.skipped.fetch_add(1, Ordering::Relaxed);
      return Ok(());
    };

    match tx.try_send(application_id) {
      Ok(()) => {
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
      }
      Err(e) => {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        Err(match e {
          mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
          mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
      }
    }
  }

  pub fn stats(&self) -> AnalysisStats {
    let c = &self.counters;
    AnalysisStats {
      enabled:   self.is_enabled(),
      enqueued:  c.enqueued.load(Ordering::Relaxed),
      completed: c.completed.load(Ordering::Relaxed),
      failed:    c.failed.load(Ordering::Relaxed),
      dropped:   c.dropped.load(Ordering::Relaxed),
      skipped:   c.skipped.load(Ordering::Relaxed),
    }
  }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
enum JobError {
  #[error("application not found")]
  Missing,
  #[error("store error: {0}")]
  Store(String),
  #[error(transparent)]
  Analyzer(#[from] AnalyzerError),
}

async fn run<S, A>(
  store: Arc<S>,
  analyzer: A,
  mut rx: mpsc::Receiver<Uuid>,
  counters: Arc<Counters>,
) where
  S: PermitStore,
  A: Analyzer,
{
  tracing::info!(model = analyzer.model(), "analysis worker started");

  while let Some(id) = rx.recv().await {
    match process(store.as_ref(), &analyzer, id).await {
      Ok(()) => {
        counters.completed.fetch_add(1, Ordering::Relaxed);
        tracing::info!(application_id = %id, "analysis completed");
      }
      Err(e) => {
        tracing::warn!(application_id = %id, error = %e, "analysis failed");
        if let Err(e) = store.record_analysis_failure(id, e.to_string()).await {
          tracing::error!(application_id = %id, error = %e, "could not record analysis failure");
        }
        counters.failed.fetch_add(1, Ordering::Relaxed);
      }
    }
  }

  tracing::info!("analysis worker stopped");
}

async fn process<S, A>(store: &S, analyzer: &A, id: Uuid) -> Result<(), JobError>
where
  S: PermitStore,
  A: Analyzer,
{
  let detail = store
    .get_application_detail(id)
    .await
    .map_err(|e| JobError::Store(e.to_string()))?
    .ok_or(JobError::Missing)?;
  let request = AnalysisRequest::from_detail(&detail);

  let (annotation, outcome) = match analyzer.analyze(&request).await {
    Ok(analysis) => {
      let done = AiAnalysis::Completed {
        analysis,
        analyzed_at: Utc::now(),
        model: analyzer.model().to_owned(),
      };
      (done, Ok(()))
    }
    Err(e) => {
      let failed = AiAnalysis::Failed { error: e.to_string(), analyzed_at: Utc::now() };
      (failed, Err(JobError::from(e)))
    }
  };

  let written = store
    .record_analysis(id, annotation)
    .await
    .map_err(|e| JobError::Store(e.to_string()))?;
  if !written {
    return Err(JobError::Missing);
  }
  outcome
}

#[cfg(test)]
pub(crate) mod tests {
  use std::time::Duration;

  use permit_core::{
    application::NewApplication,
    council::{NewCouncil, NewPermitType},
    role::Role,
    user::NewUser,
  };
  use permit_store_sqlite::SqliteStore;
  use serde_json::json;

  use super::*;

  /// Answers every request with a canned result.
  pub(crate) struct FakeAnalyzer {
    pub fail: bool,
  }

  impl Analyzer for FakeAnalyzer {
    fn model(&self) -> &str { "fake-model" }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, AnalyzerError> {
      if self.fail {
        Err(AnalyzerError::Status { status: 503, body: "overloaded".into() })
      } else {
        Ok(format!("{} looks complete", request.reference))
      }
    }
  }

  async fn submitted(store: &SqliteStore) -> Uuid {
    let user = store
      .create_user(NewUser {
        email:         "aroha@example.nz".into(),
        password_hash: None,
        first_name:    "Aroha".into(),
        last_name:     "Ngata".into(),
        phone:         None,
        address:       None,
        role:          Role::Citizen,
      })
      .await
      .unwrap();
    let council = store
      .upsert_council(NewCouncil {
        name:    "Kapiti Coast District Council".into(),
        code:    "KCDC".into(),
        country: "NZ".into(),
        region:  None,
      })
      .await
      .unwrap();
    let permit_type = store
      .upsert_permit_type(NewPermitType {
        council_id:   council.id,
        name:         "Fence Permit".into(),
        code:         "FENCE".into(),
        description:  None,
        requirements: json!({}),
        fees:         json!({}),
        is_active:    true,
      })
      .await
      .unwrap();
    store
      .submit_application(
        NewApplication {
          user_id:        user.id,
          council_id:     council.id,
          permit_type_id: permit_type.id,
          data:           json!({ "height": "1.8m" }),
        },
        2024,
      )
      .await
      .unwrap()
      .id
  }

  /// Wait until the worker has finished `jobs` jobs.
  pub(crate) async fn settle(queue: &AnalysisQueue, jobs: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
      loop {
        let stats = queue.stats();
        if stats.completed + stats.failed >= jobs {
          break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
      }
    })
    .await
    .expect("analysis did not finish");
  }

  async fn shutdown(queue: AnalysisQueue, worker: JoinHandle<()>) {
    drop(queue);
    tokio::time::timeout(Duration::from_secs(5), worker)
      .await
      .expect("worker did not stop")
      .unwrap();
  }

  #[test]
  fn prompt_mentions_the_application() {
    let request = AnalysisRequest {
      application_id: Uuid::new_v4(),
      reference:      "KCDC-2024-00001".into(),
      applicant:      "Aroha Ngata".into(),
      council:        "Kapiti Coast District Council".into(),
      permit_type:    "Fence Permit".into(),
      data:           json!({ "height": "1.8m" }),
    };
    let prompt = request.prompt();
    assert!(prompt.contains("Fence Permit with Kapiti Coast District Council"));
    assert!(prompt.contains("Applicant: Aroha Ngata"));
    assert!(prompt.contains("\"height\": \"1.8m\""));
    assert!(prompt.contains("Risk level"));
  }

  #[tokio::test]
  async fn completed_analysis_is_written_back() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let id = submitted(&store).await;

    let (queue, worker) = AnalysisQueue::start(store.clone(), FakeAnalyzer { fail: false }, 8);
    queue.enqueue(id).unwrap();
    settle(&queue, 1).await;
    let stats = queue.stats();
    shutdown(queue, worker).await;

    let app = store.get_application(id).await.unwrap().unwrap();
    match app.ai_analysis {
      Some(AiAnalysis::Completed { analysis, model, .. }) => {
        assert_eq!(analysis, "KCDC-2024-00001 looks complete");
        assert_eq!(model, "fake-model");
      }
      other => panic!("unexpected analysis: {other:?}"),
    }

    assert_eq!(stats.enqueued, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 0);
  }

  #[tokio::test]
  async fn failed_analysis_is_recorded_and_dead_lettered() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let id = submitted(&store).await;

    let (queue, worker) = AnalysisQueue::start(store.clone(), FakeAnalyzer { fail: true }, 8);
    queue.enqueue(id).unwrap();
    settle(&queue, 1).await;
    let stats = queue.stats();
    shutdown(queue, worker).await;

    let app = store.get_application(id).await.unwrap().unwrap();
    assert!(app.ai_analysis.as_ref().is_some_and(AiAnalysis::is_failure));

    let failures = store.list_analysis_failures(Some(id)).await.unwrap();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].error.contains("503"));
    assert_eq!(stats.failed, 1);
  }

  #[tokio::test]
  async fn missing_application_counts_as_failure() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let (queue, worker) = AnalysisQueue::start(store.clone(), FakeAnalyzer { fail: false }, 8);
    queue.enqueue(Uuid::new_v4()).unwrap();
    settle(&queue, 1).await;
    let stats = queue.stats();
    shutdown(queue, worker).await;

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 0);
  }

  #[tokio::test]
  async fn disabled_queue_skips_jobs() {
    let queue = AnalysisQueue::disabled();
    assert!(queue.enqueue(Uuid::new_v4()).is_ok());
    let stats = queue.stats();
    assert!(!stats.enabled);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.enqueued, 0);
  }
}
