use chrono::{Datelike, NaiveDate, Utc};
use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use std::fmt;
use std::str::FromStr;

use crate::models::{format_datetime, Location, User, UserSummary, USERS};
use crate::utils::{contains_pattern, split_csv, WorkflowError};

/// Hours assumed per completed job when estimating earnings.
pub const AVERAGE_HOURS_PER_JOB: i64 = 4;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Expertise {
    #[default]
    Beginner,
    Intermediate,
    Expert,
    Master,
}

impl FromStr for Expertise {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(Expertise::Beginner),
            "intermediate" => Ok(Expertise::Intermediate),
            "expert" => Ok(Expertise::Expert),
            "master" => Ok(Expertise::Master),
            other => Err(WorkflowError::Validation(format!(
                "Invalid expertise '{}' (beginner, intermediate, expert, master)",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Expertise {
    type Error = WorkflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Expertise {
    pub fn as_str(&self) -> &'static str {
        match self {
            Expertise::Beginner => "beginner",
            Expertise::Intermediate => "intermediate",
            Expertise::Expert => "expert",
            Expertise::Master => "master",
        }
    }
}

impl fmt::Display for Expertise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Worker {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId,
    pub skills: Vec<String>,
    pub expertise: Expertise,
    pub bio: Option<String>,
    pub rating: f64,
    pub review_count: i32,
    pub hourly_rate: Option<i32>,
    pub availability: bool,
    pub completed_jobs: i32,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Worker {
    pub fn new(user_id: ObjectId) -> Self {
        let now = DateTime::now();
        Worker {
            id: ObjectId::new(),
            user_id,
            skills: Vec::new(),
            expertise: Expertise::default(),
            bio: None,
            rating: 0.0,
            review_count: 0,
            hourly_rate: None,
            availability: true,
            completed_jobs: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Skills behave as a set: trimmed, blanks dropped, first spelling of a
/// case-insensitive duplicate kept.
pub fn normalize_skills(skills: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    skills
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
        .collect()
}

#[derive(Debug, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkerProfileDto {
    pub skills: Option<Vec<String>>,
    pub expertise: Option<Expertise>,
    pub bio: Option<String>,
    pub hourly_rate: Option<i32>,
    pub availability: Option<bool>,
}

impl UpdateWorkerProfileDto {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.hourly_rate.is_some_and(|rate| rate < 0) {
            return Err(WorkflowError::Validation(
                "Hourly rate cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn apply(&self, worker: &mut Worker) {
        if let Some(ref skills) = self.skills {
            worker.skills = normalize_skills(skills.clone());
        }
        if let Some(expertise) = self.expertise {
            worker.expertise = expertise;
        }
        if let Some(ref bio) = self.bio {
            worker.bio = Some(bio.clone());
        }
        if let Some(rate) = self.hourly_rate {
            worker.hourly_rate = Some(rate);
        }
        if let Some(available) = self.availability {
            worker.availability = available;
        }
        worker.updated_at = DateTime::now();
    }

    pub fn to_set_document(&self) -> Document {
        let mut set = doc! { "updated_at": DateTime::now() };

        if let Some(ref skills) = self.skills {
            set.insert("skills", normalize_skills(skills.clone()));
        }
        if let Some(expertise) = self.expertise {
            set.insert("expertise", expertise.as_str());
        }
        if let Some(ref bio) = self.bio {
            set.insert("bio", bio);
        }
        if let Some(rate) = self.hourly_rate {
            set.insert("hourly_rate", rate);
        }
        if let Some(available) = self.availability {
            set.insert("availability", available);
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_none()
            && self.expertise.is_none()
            && self.bio.is_none()
            && self.hourly_rate.is_none()
            && self.availability.is_none()
    }
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
    pub id: String,
    pub user_id: String,
    pub skills: Vec<String>,
    pub expertise: Expertise,
    pub bio: Option<String>,
    pub rating: f64,
    pub review_count: i32,
    pub hourly_rate: Option<i32>,
    pub availability: bool,
    pub completed_jobs: i32,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
}

impl From<Worker> for WorkerResponse {
    fn from(worker: Worker) -> Self {
        WorkerResponse {
            id: worker.id.to_hex(),
            user_id: worker.user_id.to_hex(),
            skills: worker.skills,
            expertise: worker.expertise,
            bio: worker.bio,
            rating: worker.rating,
            review_count: worker.review_count,
            hourly_rate: worker.hourly_rate,
            availability: worker.availability,
            completed_jobs: worker.completed_jobs,
            created_at: format_datetime(worker.created_at),
            user: None,
        }
    }
}

/// A worker joined with its owning user by the discovery pipelines.
#[derive(Debug, Deserialize)]
pub struct WorkerWithUser {
    pub worker: Worker,
    pub user: User,
}

impl From<WorkerWithUser> for WorkerResponse {
    fn from(row: WorkerWithUser) -> Self {
        let mut response = WorkerResponse::from(row.worker);
        response.user = Some(row.user.into());
        response
    }
}

fn join_user_stages() -> [Document; 2] {
    [
        doc! {
            "$lookup": {
                "from": USERS,
                "localField": "user_id",
                "foreignField": "_id",
                "as": "user"
            }
        },
        doc! { "$unwind": "$user" },
    ]
}

fn project_worker_with_user() -> Document {
    doc! { "$project": { "worker": "$$ROOT", "user": "$user" } }
}

/// Single worker profile joined with its user.
pub fn worker_by_id_pipeline(worker_id: ObjectId) -> Vec<Document> {
    let mut pipeline = vec![doc! { "$match": { "_id": worker_id } }];
    pipeline.extend(join_user_stages());
    pipeline.push(project_worker_with_user());
    pipeline
}

// ============================================================================
// AVAILABLE WORKERS (booking flow)
// ============================================================================

#[derive(Debug, FromForm, Deserialize, Default, JsonSchema)]
pub struct AvailableWorkersQuery {
    /// Comma-separated; a worker matches when it has any of them.
    pub skills: Option<String>,
    /// Matches the user's county, town or area exactly.
    pub location: Option<String>,
}

impl AvailableWorkersQuery {
    pub fn pipeline(&self) -> Vec<Document> {
        let mut worker_match = doc! { "availability": true };
        if let Some(skills) = self.skills.as_deref().map(split_csv) {
            if !skills.is_empty() {
                worker_match.insert("skills", doc! { "$in": skills });
            }
        }

        let mut pipeline = vec![doc! { "$match": worker_match }];
        pipeline.extend(join_user_stages());

        if let Some(location) = self.location.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            pipeline.push(doc! {
                "$match": {
                    "$or": [
                        { "user.county": location },
                        { "user.town": location },
                        { "user.area": location },
                    ]
                }
            });
        }

        pipeline.push(doc! { "$sort": { "rating": -1, "review_count": -1, "_id": 1 } });
        pipeline.push(project_worker_with_user());
        pipeline
    }
}

// ============================================================================
// WORKER SEARCH
// ============================================================================

#[derive(Debug, FromForm, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSearchQuery {
    /// Comma-separated; a worker must have every listed skill.
    pub skills: Option<String>,
    pub availability: Option<bool>,
    #[field(name = "minRating")]
    pub min_rating: Option<f64>,
    #[field(name = "maxPrice")]
    pub max_price: Option<f64>,
    /// Case-insensitive substring over the worker's name and bio.
    #[field(name = "searchQuery")]
    pub search_query: Option<String>,
    /// JSON object such as `{"county":"Nairobi","town":"Westlands"}`.
    pub location: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn new(page: Option<i64>, limit: Option<i64>, default_limit: i64) -> Self {
        Page {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Saturates for absurd page numbers; the result is then simply past
    /// the last row.
    pub fn skip(&self) -> i64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        total.saturating_add(self.limit - 1) / self.limit
    }

    pub fn to_json(&self, total: i64) -> serde_json::Value {
        serde_json::json!({
            "total": total,
            "page": self.page,
            "pages": self.total_pages(total),
            "limit": self.limit,
        })
    }
}

impl WorkerSearchQuery {
    pub fn page(&self) -> Page {
        Page::new(self.page, self.limit, DEFAULT_PAGE_SIZE)
    }

    fn location_filter(&self) -> Result<Option<Location>, WorkflowError> {
        match self.location.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            None => Ok(None),
            Some(raw) => serde_json::from_str::<Location>(raw)
                .map(Some)
                .map_err(|_| WorkflowError::Validation(
                    "location must be a JSON object with county and/or town".to_string(),
                )),
        }
    }

    /// `$facet` output: `{ items: [WorkerWithUser], total: [{ count }] }`.
    pub fn pipeline(&self) -> Result<Vec<Document>, WorkflowError> {
        let mut worker_match = Document::new();

        if let Some(available) = self.availability {
            worker_match.insert("availability", available);
        }
        if let Some(skills) = self.skills.as_deref().map(split_csv) {
            if !skills.is_empty() {
                worker_match.insert("skills", doc! { "$all": skills });
            }
        }
        if let Some(min_rating) = self.min_rating {
            worker_match.insert("rating", doc! { "$gte": min_rating });
        }
        if let Some(max_price) = self.max_price {
            worker_match.insert("hourly_rate", doc! { "$lte": max_price });
        }

        let mut user_match = Document::new();
        if let Some(search) = self.search_query.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = contains_pattern(search);
            user_match.insert(
                "$or",
                vec![
                    doc! { "user.name": pattern.clone() },
                    doc! { "bio": pattern },
                ],
            );
        }
        if let Some(location) = self.location_filter()? {
            if let Some(county) = location.county {
                user_match.insert("user.county", county);
            }
            if let Some(town) = location.town {
                user_match.insert("user.town", town);
            }
        }

        let page = self.page();
        let mut pipeline = vec![doc! { "$match": worker_match }];
        pipeline.extend(join_user_stages());
        if !user_match.is_empty() {
            pipeline.push(doc! { "$match": user_match });
        }
        pipeline.push(doc! { "$sort": { "rating": -1, "review_count": -1, "_id": 1 } });
        pipeline.push(doc! {
            "$facet": {
                "items": [
                    { "$skip": page.skip() },
                    { "$limit": page.limit },
                    project_worker_with_user(),
                ],
                "total": [ { "$count": "count" } ],
            }
        });
        Ok(pipeline)
    }
}

#[derive(Debug, Deserialize)]
pub struct CountRow {
    pub count: i64,
}

#[derive(Debug, Deserialize)]
pub struct WorkerSearchPage {
    pub items: Vec<WorkerWithUser>,
    pub total: Vec<CountRow>,
}

impl WorkerSearchPage {
    pub fn total(&self) -> i64 {
        self.total.first().map(|row| row.count).unwrap_or(0)
    }
}

// ============================================================================
// STATS
// ============================================================================

#[derive(Debug, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStats {
    pub completed_jobs: i32,
    pub rating: f64,
    pub earnings: i64,
    pub monthly_earnings: i64,
    pub review_count: i32,
    pub growth_percentage: i64,
    pub availability: bool,
    pub profile_completion: i64,
}

impl WorkerStats {
    pub fn compute(worker: &Worker, user: &User, completed_this_month: i64, completed_last_month: i64) -> Self {
        let rate = worker.hourly_rate.unwrap_or(0) as i64;

        WorkerStats {
            completed_jobs: worker.completed_jobs,
            rating: worker.rating,
            earnings: rate * worker.completed_jobs as i64 * AVERAGE_HOURS_PER_JOB,
            monthly_earnings: rate * completed_this_month * AVERAGE_HOURS_PER_JOB,
            review_count: worker.review_count,
            growth_percentage: growth_percentage(completed_this_month, completed_last_month),
            availability: worker.availability,
            profile_completion: profile_completion(worker, user),
        }
    }
}

pub fn growth_percentage(this_month: i64, last_month: i64) -> i64 {
    if last_month > 0 {
        (((this_month - last_month) as f64 / last_month as f64) * 100.0).round() as i64
    } else if this_month > 0 {
        100
    } else {
        0
    }
}

/// Five equally weighted fields: image, bio, skills, rate, full location.
pub fn profile_completion(worker: &Worker, user: &User) -> i64 {
    let filled = [
        user.profile_image.as_deref().is_some_and(|s| !s.is_empty()),
        worker.bio.as_deref().is_some_and(|b| !b.trim().is_empty()),
        !worker.skills.is_empty(),
        worker.hourly_rate.is_some_and(|rate| rate > 0),
        user.location().is_complete(),
    ]
    .iter()
    .filter(|present| **present)
    .count();

    ((filled as f64 / 5.0) * 100.0).round() as i64
}

/// `[last month start, this month start, next month start)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthWindows {
    pub last_month_start: DateTime,
    pub this_month_start: DateTime,
    pub next_month_start: DateTime,
}

fn month_start(year: i32, month: u32) -> Option<DateTime> {
    let date = NaiveDate::from_ymd_opt(year, month, 1)?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(DateTime::from_millis(midnight.and_utc().timestamp_millis()))
}

fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 + delta;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

pub fn month_windows(now: chrono::DateTime<Utc>) -> Option<MonthWindows> {
    let (year, month) = (now.year(), now.month());
    let (last_year, last_month) = shift_month(year, month, -1);
    let (next_year, next_month) = shift_month(year, month, 1);

    Some(MonthWindows {
        last_month_start: month_start(last_year, last_month)?,
        this_month_start: month_start(year, month)?,
        next_month_start: month_start(next_year, next_month)?,
    })
}

#[cfg(test)]
pub(crate) fn sample_worker(user_id: ObjectId) -> Worker {
    let mut worker = Worker::new(user_id);
    worker.skills = vec!["plumbing".to_string()];
    worker.hourly_rate = Some(20);
    worker
}
