/// Read-through caching around an async computation.
///
/// Returns the cached value for `$key` when present. Otherwise awaits
/// `$block`, queues the result for storage with `$ttl` seconds of expiry and
/// returns it. A failed cache read is logged and treated as a miss, so Redis
/// being down never fails the caller.
///
/// # Arguments
/// * `$cache`: a [`Cache`](crate::db::Cache).
/// * `$key`: the [`CacheKey`](crate::db::CacheKey) to read and write.
/// * `$ttl`: expiry in seconds.
/// * `$block`: a future resolving to `AppResult<T>`, awaited only on a miss.
///
/// # Example
/// ```rust,ignore
/// let key = CacheKey::Recommendations { user_id, count };
/// cached!(self.cache, key, self.ttl, self.inner.recommend(user_id, count))
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        match $cache.get_from_cache(&$key).await {
            Ok(Some(hit)) => {
                tracing::debug!(key = %$key, "Cache hit");
                Ok(hit)
            }
            lookup => {
                if let Err(e) = lookup {
                    tracing::warn!(key = %$key, error = %e, "Cache read failed; computing instead");
                }
                let value = $block.await?;
                $cache.set_in_background(&$key, &value, $ttl);
                Ok(value)
            }
        }
    }};
}
