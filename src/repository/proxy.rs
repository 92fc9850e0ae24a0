use crate::error::{PoolError, Result};
use crate::models::{Anonymity, ProbeOutcome, Protocol, ProxyFilter, ProxyRecord};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use rand::seq::SliceRandom;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{info, warn};

/// Writes only the fields a probe owns. Score and the domain blacklist are
/// consumer state and must never appear here.
const RECORD_PROBE_SQL: &str = r#"
    UPDATE proxies
    SET protocol = $2,
        anonymity = $3,
        speed = $4,
        checked_at = NOW()
    WHERE ip = $1
"#;

/// Eviction only fires while the score is still zero; a reset_score landing
/// in between keeps the row.
const EVICT_SQL: &str = "DELETE FROM proxies WHERE ip = $1 AND score = 0";

/// Repository for proxy pool database operations.
///
/// Every operation is keyed by `ip` and implemented as a single SQL
/// statement, so the existence check of `insert` and the read-modify-write
/// of `penalize`/`disable_domain` stay atomic under concurrent validators.
#[derive(Clone)]
pub struct ProxyRepository {
    pool: PgPool,
}

impl ProxyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a record unless its ip is already present.
    ///
    /// Re-discovering a known proxy is a no-op: the stored record keeps its
    /// accumulated score and domain blacklist. Returns whether a row was
    /// actually inserted.
    pub async fn insert(&self, record: &ProxyRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO proxies (ip, port, protocol, anonymity, speed, area, score,
                                 disabled_domains, checked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (ip) DO NOTHING
            "#,
        )
        .bind(&record.ip)
        .bind(record.port)
        .bind(record.protocol)
        .bind(record.anonymity)
        .bind(record.speed)
        .bind(&record.area)
        .bind(record.score)
        .bind(&record.disabled_domains)
        .bind(record.checked_at)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            info!(ip = %record.ip, port = record.port, "Inserted proxy");
        } else {
            warn!(ip = %record.ip, "Proxy already exists, keeping stored record");
        }

        Ok(inserted)
    }

    /// Overwrite every mutable field of an existing record.
    ///
    /// A missing ip is a no-op returning `false`; `ip` itself is never
    /// rewritten.
    pub async fn replace(&self, record: &ProxyRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE proxies
            SET port = $2,
                protocol = $3,
                anonymity = $4,
                speed = $5,
                area = $6,
                score = $7,
                disabled_domains = $8,
                checked_at = $9
            WHERE ip = $1
            "#,
        )
        .bind(&record.ip)
        .bind(record.port)
        .bind(record.protocol)
        .bind(record.anonymity)
        .bind(record.speed)
        .bind(&record.area)
        .bind(record.score)
        .bind(&record.disabled_domains)
        .bind(record.checked_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a record; deleting a missing ip is not an error
    pub async fn delete(&self, ip: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM proxies WHERE ip = $1")
            .bind(ip)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(ip = ip, "Deleted proxy");
        }

        Ok(deleted)
    }

    /// Get a record by ip
    pub async fn get(&self, ip: &str) -> Result<Option<ProxyRecord>> {
        let record = sqlx::query_as::<_, ProxyRecord>(
            r#"
            SELECT ip, port, protocol, anonymity, speed, area, score,
                   disabled_domains, checked_at, created_at, updated_at
            FROM proxies
            WHERE ip = $1
            "#,
        )
        .bind(ip)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Stream every record, unordered.
    ///
    /// Lazy and restartable: each call opens a fresh cursor over the current
    /// table state.
    pub fn stream_all(&self) -> BoxStream<'_, Result<ProxyRecord>> {
        sqlx::query_as::<_, ProxyRecord>(
            r#"
            SELECT ip, port, protocol, anonymity, speed, area, score,
                   disabled_domains, checked_at, created_at, updated_at
            FROM proxies
            "#,
        )
        .fetch(&self.pool)
        .map_err(PoolError::from)
        .boxed()
    }

    /// Query records matching a conjunctive filter.
    ///
    /// Results are ranked best-first: score descending, then speed
    /// ascending. Records with equal score and speed may appear in either
    /// order. `limit = 0` means unbounded. A record whose score has reached
    /// zero is never returned, even before its eviction lands.
    pub async fn find(&self, filter: &ProxyFilter, limit: i64) -> Result<Vec<ProxyRecord>> {
        let mut query = build_find_query(filter, limit);
        let records = query.build_query_as().fetch_all(&self.pool).await?;
        Ok(records)
    }

    /// Select proxies usable for a target scheme and destination domain.
    ///
    /// `protocol = None` requires proxies that support both schemes;
    /// `"http"`/`"https"` accept proxies supporting that scheme. Anything
    /// else is diagnosed and yields an empty result rather than an error.
    /// When a domain is given, proxies with that domain blacklisted are
    /// excluded. Anonymity defaults to the strictest class (elite) unless
    /// overridden.
    pub async fn select(
        &self,
        protocol: Option<&str>,
        domain: Option<&str>,
        anonymity: Option<Anonymity>,
        limit: i64,
    ) -> Result<Vec<ProxyRecord>> {
        let protocols = match Protocol::matching(protocol) {
            Some(protocols) => protocols,
            None => {
                warn!(
                    protocol = protocol.unwrap_or_default(),
                    "Unrecognized protocol requested, returning no proxies"
                );
                return Ok(Vec::new());
            }
        };

        let filter = ProxyFilter {
            protocols: Some(protocols),
            anonymity: Some(anonymity.unwrap_or(Anonymity::Elite)),
            usable_for_domain: domain.map(str::to_string),
            ..ProxyFilter::default()
        };

        self.find(&filter, limit).await
    }

    /// Pick one proxy uniformly at random from the ranked selection.
    ///
    /// An empty eligible set is surfaced as [`PoolError::EmptyPool`] so the
    /// caller can trigger fallback logic explicitly.
    pub async fn select_random(
        &self,
        protocol: Option<&str>,
        domain: Option<&str>,
        anonymity: Option<Anonymity>,
        limit: i64,
    ) -> Result<ProxyRecord> {
        let candidates = self.select(protocol, domain, anonymity, limit).await?;

        let mut rng = rand::thread_rng();
        candidates.choose(&mut rng).cloned().ok_or(PoolError::EmptyPool)
    }

    /// Blacklist a domain for a proxy, if not already blacklisted.
    ///
    /// Push-if-absent in one statement, so concurrent calls cannot duplicate
    /// the entry. Returns whether the domain was newly added.
    pub async fn disable_domain(&self, ip: &str, domain: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE proxies
            SET disabled_domains = array_append(disabled_domains, $2)
            WHERE ip = $1 AND NOT ($2 = ANY(disabled_domains))
            "#,
        )
        .bind(ip)
        .bind(domain)
        .execute(&self.pool)
        .await?;

        let added = result.rows_affected() > 0;
        if added {
            info!(ip = ip, domain = domain, "Disabled domain for proxy");
        }

        Ok(added)
    }

    /// Decrement a proxy's score, clamped at zero.
    ///
    /// A proxy whose score reaches zero is evicted immediately. Returns the
    /// new score, or `None` when the ip is unknown.
    pub async fn penalize(&self, ip: &str, amount: i32) -> Result<Option<i32>> {
        let score: Option<i32> = sqlx::query_scalar(
            "UPDATE proxies SET score = GREATEST(score - $2, 0) WHERE ip = $1 RETURNING score",
        )
        .bind(ip)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        if score == Some(0) {
            let result = sqlx::query(EVICT_SQL).bind(ip).execute(&self.pool).await?;
            if result.rows_affected() > 0 {
                info!(ip = ip, "Score exhausted, evicted proxy");
            }
        }

        Ok(score)
    }

    /// Record a probe outcome against a stored proxy.
    ///
    /// Only protocol, anonymity, speed, and the check timestamp are written;
    /// score and the domain blacklist are left alone, so a `penalize` or
    /// `disable_domain` racing the probe is never undone. Returns whether
    /// the ip was present.
    pub async fn record_probe(&self, ip: &str, outcome: &ProbeOutcome) -> Result<bool> {
        let result = sqlx::query(RECORD_PROBE_SQL)
            .bind(ip)
            .bind(outcome.protocol.as_i16())
            .bind(outcome.anonymity.as_i16())
            .bind(outcome.speed)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Restore a proxy's score to the configured maximum after a successful
    /// re-validation
    pub async fn reset_score(&self, ip: &str, max_score: i32) -> Result<bool> {
        let result = sqlx::query("UPDATE proxies SET score = $2 WHERE ip = $1")
            .bind(ip)
            .bind(max_score)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Total pool size
    pub async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM proxies")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Build the ranked lookup query for a filter.
///
/// Zero-score records are excluded unconditionally: a proxy that has spent
/// its score is not selectable in the window between the score hitting zero
/// and the eviction statement running.
fn build_find_query(filter: &ProxyFilter, limit: i64) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::<Postgres>::new(
        r#"
        SELECT ip, port, protocol, anonymity, speed, area, score,
               disabled_domains, checked_at, created_at, updated_at
        FROM proxies
        WHERE score > 0
        "#,
    );

    if let Some(ref protocols) = filter.protocols {
        let values: Vec<i16> = protocols.iter().map(|p| p.as_i16()).collect();
        query.push(" AND protocol = ANY(").push_bind(values).push(")");
    }
    if let Some(anonymity) = filter.anonymity {
        query.push(" AND anonymity = ").push_bind(anonymity.as_i16());
    }
    if let Some(ref domain) = filter.usable_for_domain {
        query
            .push(" AND NOT (")
            .push_bind(domain.clone())
            .push(" = ANY(disabled_domains))");
    }
    if let Some(ref area) = filter.area {
        query.push(" AND area = ").push_bind(area.clone());
    }
    if let Some(port) = filter.port {
        query.push(" AND port = ").push_bind(port);
    }

    query.push(" ORDER BY score DESC, speed ASC");
    if limit > 0 {
        query.push(" LIMIT ").push_bind(limit);
    }

    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_query_excludes_spent_scores() {
        // The guard has to sit in the base clause so every lookup carries
        // it, whatever else the filter asks for.
        let sql = build_find_query(&ProxyFilter::default(), 0).into_sql();
        assert!(sql.contains("WHERE score > 0"));
        assert!(sql.contains("ORDER BY score DESC, speed ASC"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn test_find_query_applies_every_filter_leg() {
        let filter = ProxyFilter {
            protocols: Some(vec![Protocol::Http, Protocol::Both]),
            anonymity: Some(Anonymity::Elite),
            usable_for_domain: Some("example.com".to_string()),
            area: Some("us-east".to_string()),
            port: Some(8080),
        };

        let sql = build_find_query(&filter, 5).into_sql();
        assert!(sql.contains("WHERE score > 0"));
        assert!(sql.contains("AND protocol = ANY("));
        assert!(sql.contains("AND anonymity ="));
        assert!(sql.contains("= ANY(disabled_domains)"));
        assert!(sql.contains("AND area ="));
        assert!(sql.contains("AND port ="));
        assert!(sql.contains("LIMIT"));
    }

    #[test]
    fn test_eviction_requires_score_still_zero() {
        assert!(EVICT_SQL.contains("AND score = 0"));
    }

    #[test]
    fn test_probe_write_skips_consumer_state() {
        assert!(!RECORD_PROBE_SQL.contains("score"));
        assert!(!RECORD_PROBE_SQL.contains("disabled_domains"));
        assert!(RECORD_PROBE_SQL.contains("checked_at"));
    }
}
