use rand::distributions::Alphanumeric;
use rand::Rng;

const SUFFIX_LEN: usize = 8;

/// Generate a client-side id: `"{now_millis}{8 random alphanumerics}"`.
///
/// Unique per device with overwhelming probability. The millisecond prefix
/// keeps ids roughly time-ordered for debugging; it is not a sort key.
pub fn new_id(now_millis: i64) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{now_millis}{suffix}")
}

/// Generate an id not accepted by `taken`.
pub(crate) fn new_unique_id(now_millis: i64, mut taken: impl FnMut(&str) -> bool) -> String {
    loop {
        let id = new_id(now_millis);
        if !taken(&id) {
            return id;
        }
    }
}
