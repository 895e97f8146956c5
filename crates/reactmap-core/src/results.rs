//! Persistence of clustering runs and their assignments.

use crate::store::ReactionStore;
use crate::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use reactmap_types::{ClusterAssignment, ClusteringRun};
use rusqlite::{params, OptionalExtension};
use tracing::info;
use uuid::Uuid;

/// Fixed-width UTC timestamp so lexical order equals chronological order.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

impl ReactionStore {
    /// Upsert a run and replace its assignments in one transaction.
    pub fn save_run(&self, run: &ClusteringRun) -> Result<()> {
        let run_id = run.run_id.to_string();
        let params_json = serde_json::to_string(&run.parameters)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO clustering_runs
                (run_id, algorithm, params_json, text_weight, behavior_weight,
                 n_clusters, silhouette_score, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(run_id) DO UPDATE SET
                algorithm = excluded.algorithm,
                params_json = excluded.params_json,
                text_weight = excluded.text_weight,
                behavior_weight = excluded.behavior_weight,
                n_clusters = excluded.n_clusters,
                silhouette_score = excluded.silhouette_score,
                created_at = excluded.created_at
            "#,
            params![
                run_id,
                run.algorithm,
                params_json,
                run.text_weight,
                run.behavior_weight,
                run.cluster_count as i64,
                run.quality_score,
                format_timestamp(run.created_at),
            ],
        )?;
        tx.execute(
            "DELETE FROM cluster_assignments WHERE run_id = ?1",
            params![run_id],
        )?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO cluster_assignments (run_id, reaction_name, cluster_id, confidence)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )?;
            for assignment in &run.assignments {
                stmt.execute(params![
                    run_id,
                    assignment.reaction_name,
                    assignment.cluster_id,
                    assignment.confidence,
                ])?;
            }
        }
        tx.commit()?;

        info!(
            target: "reactmap::store",
            "Saved clustering run {} ({}, {} assignments)",
            run.run_id,
            run.algorithm,
            run.assignments.len()
        );
        Ok(())
    }

    /// Most recently created run with its assignments, if any.
    ///
    /// Ties on `created_at` go to the run inserted last.
    pub fn latest_run(&self) -> Result<Option<ClusteringRun>> {
        let conn = self.conn()?;
        let run = conn
            .query_row(
                r#"
                SELECT run_id, algorithm, params_json, text_weight, behavior_weight,
                       n_clusters, silhouette_score, created_at
                FROM clustering_runs
                ORDER BY created_at DESC, rowid DESC
                LIMIT 1
                "#,
                [],
                |row| {
                    let run_id: String = row.get("run_id")?;
                    let params_json: String = row.get("params_json")?;
                    let n_clusters: i64 = row.get("n_clusters")?;
                    let created_at: String = row.get("created_at")?;
                    Ok(ClusteringRun {
                        run_id: Uuid::parse_str(&run_id).unwrap_or_default(),
                        algorithm: row.get("algorithm")?,
                        parameters: serde_json::from_str(&params_json)
                            .unwrap_or(serde_json::Value::Null),
                        text_weight: row.get("text_weight")?,
                        behavior_weight: row.get("behavior_weight")?,
                        cluster_count: n_clusters.max(0) as usize,
                        quality_score: row.get("silhouette_score")?,
                        created_at: parse_timestamp(&created_at),
                        assignments: Vec::new(),
                    })
                },
            )
            .optional()?;

        let Some(mut run) = run else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT reaction_name, cluster_id, confidence
            FROM cluster_assignments
            WHERE run_id = ?1
            ORDER BY rowid
            "#,
        )?;
        let run_id = run.run_id;
        run.assignments = stmt
            .query_map(params![run_id.to_string()], |row| {
                Ok(ClusterAssignment {
                    run_id,
                    reaction_name: row.get(0)?,
                    cluster_id: row.get(1)?,
                    confidence: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(run))
    }

    /// Number of persisted runs.
    pub fn run_count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM clustering_runs", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
