//! A single-classroom Rollcall server with in-memory stores.
//!
//! Seeds a teacher and a roster of students, opens a session for the
//! class at boot, and prints a ready-to-use WebSocket URL for each user.
//!
//! ```text
//! ROLLCALL_JWT_SECRET=dev ROLLCALL_ROSTER=alice,bob cargo run -p classroom
//! ```

use rollcall::prelude::*;
use tracing_subscriber::EnvFilter;

const CLASS_ID_KEY: &str = "ROLLCALL_CLASS_ID";
const ROSTER_KEY: &str = "ROLLCALL_ROSTER";
const TEACHER_KEY: &str = "ROLLCALL_TEACHER_ID";

/// Users and roster for one class.
struct Classroom {
    class_id: ClassId,
    teacher: Identity,
    students: Vec<Identity>,
}

impl Classroom {
    fn from_env() -> Self {
        let var = |key: &str, default: &str| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            class_id: ClassId::new(var(CLASS_ID_KEY, "C1")),
            teacher: Identity::teacher(var(TEACHER_KEY, "T1")),
            students: parse_roster(&var(ROSTER_KEY, "S1,S2,S3")),
        }
    }

    async fn seed(&self, directory: &MemoryDirectory, roster: &MemoryRoster) {
        directory.insert(self.teacher.clone()).await;
        for student in &self.students {
            directory.insert(student.clone()).await;
        }
        roster
            .insert_class(
                self.class_id.clone(),
                self.students.iter().map(|s| s.participant_id.clone()),
            )
            .await;
    }

    fn everyone(&self) -> impl Iterator<Item = &Identity> {
        std::iter::once(&self.teacher).chain(&self.students)
    }
}

/// Comma-separated student ids; blanks and duplicates are skipped.
fn parse_roster(raw: &str) -> Vec<Identity> {
    let mut students: Vec<Identity> = Vec::new();
    for id in raw.split(',').map(str::trim).filter(|id| !id.is_empty()) {
        if !students.iter().any(|s| s.participant_id.as_str() == id) {
            students.push(Identity::student(id));
        }
    }
    students
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let classroom = Classroom::from_env();

    let directory = MemoryDirectory::new();
    let roster = MemoryRoster::new();
    classroom.seed(&directory, &roster).await;

    let issuer = JwtAuthenticator::new(config.jwt_secret.as_bytes(), directory.clone());
    let server = RollcallServerBuilder::from_config(&config)
        .build(
            JwtAuthenticator::new(config.jwt_secret.as_bytes(), directory),
            roster,
            MemoryAttendanceStore::new(),
        )
        .await?;

    let info = server.hub().start_session(classroom.class_id.clone()).await?;
    tracing::info!(
        class_id = %info.class_id,
        students = classroom.students.len(),
        "session open"
    );

    let addr = server.local_addr()?;
    for identity in classroom.everyone() {
        let token = issuer.issue_token(identity, chrono::Duration::hours(12))?;
        eprintln!(
            "{:<8} {:<12} ws://{addr}/?token={token}",
            identity.role.to_string(),
            identity.participant_id.as_str()
        );
    }

    server.run().await?;
    Ok(())
}
