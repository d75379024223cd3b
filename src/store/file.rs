//! Crash-safe file-backed [`KeyStore`].
//!
//! The pool lives in two files:
//!
//! - `<path>` holds the unissued keys, one per line. It is only ever replaced wholesale by
//!   compaction (write `<path>.tmp`, fsync, rename), so readers see either the old or the new
//!   snapshot and never a truncated one.
//! - `<path>.taken` is an append-only issuance log. A key is appended and fsynced before it is
//!   handed out. Opening the store subtracts every logged key from the snapshot.
//!
//! Compaction drops issued keys from the snapshot and then truncates the log. Because replaying
//! the log is idempotent, a crash between the rename and the truncation is harmless.
//!
//! A failed append is rolled back to the last known log length. If the rollback fails too, the
//! log may end in a line for a key that was never handed out, so the store refuses every take
//! until a successful compaction (or a reopen) brings the log back to a known state.

// std
use std::{
	fs::{self, File, OpenOptions},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	key::ActivationKey,
	obs,
	store::{self, KeyStore, StoreError, StoreFuture},
};

/// Issuance log entries tolerated before the snapshot is compacted.
pub const DEFAULT_COMPACT_AFTER: usize = 1_024;

/// Persists the pool as a newline-delimited snapshot plus an append-only issuance log.
#[derive(Clone, Debug)]
pub struct FileStore {
	inner: Arc<Mutex<PoolFiles>>,
}
impl FileStore {
	/// Opens (or creates) a store at `path`, replaying any issuance log left by a previous run.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let files = PoolFiles::load(path.into())?;

		Ok(Self { inner: Arc::new(Mutex::new(files)) })
	}

	/// Overrides how many issuance log entries trigger a compaction.
	pub fn with_compact_after(self, entries: usize) -> Self {
		self.inner.lock().compact_after = entries.max(1);

		self
	}

	/// Path of the snapshot file.
	pub fn path(&self) -> PathBuf {
		self.inner.lock().pool_path.clone()
	}

	/// Rewrites the snapshot without issued keys and clears the issuance log.
	pub fn compact(&self) -> Result<(), StoreError> {
		self.inner.lock().compact(&[])
	}
}
impl KeyStore for FileStore {
	fn append(&self, keys: Vec<ActivationKey>) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.lock();

			store::ensure_unique(guard.pool.iter(), &keys)?;
			guard.compact(&keys)?;
			guard.pool.extend(keys);

			Ok(())
		})
	}

	fn take_one(&self) -> StoreFuture<'_, ActivationKey> {
		Box::pin(async move {
			let mut guard = self.inner.lock();

			if guard.poisoned {
				return Err(StoreError::Backend {
					message: format!(
						"Issuance log {} is in an unknown state; compact or reopen the store",
						guard.log_path.display()
					),
				});
			}

			let head = guard.pool.front().cloned().ok_or(StoreError::EmptyPool)?;

			guard.record_taken(&head)?;
			guard.pool.pop_front();

			if guard.log_entries >= guard.compact_after {
				// The take is already durable; a failed compaction only delays log cleanup.
				if let Err(e) = guard.compact(&[]) {
					guard.log_entries = 0;

					obs::log_warn!(error = %e, "pool compaction failed");
				}
			}

			Ok(head)
		})
	}

	fn remaining(&self) -> StoreFuture<'_, usize> {
		Box::pin(async move { Ok(self.inner.lock().pool.len()) })
	}

	fn snapshot(&self) -> StoreFuture<'_, Vec<ActivationKey>> {
		Box::pin(async move { Ok(self.inner.lock().pool.iter().cloned().collect()) })
	}
}

#[derive(Debug)]
struct PoolFiles {
	pool_path: PathBuf,
	log_path: PathBuf,
	tmp_path: PathBuf,
	pool: VecDeque<ActivationKey>,
	log: File,
	log_len: u64,
	log_entries: usize,
	compact_after: usize,
	// Set when a failed append could not be rolled back; takes are refused until a compaction
	// truncates the log.
	poisoned: bool,
}
impl PoolFiles {
	fn load(pool_path: PathBuf) -> Result<Self, StoreError> {
		ensure_parent_exists(&pool_path)?;

		let log_path = sibling(&pool_path, "taken");
		let tmp_path = sibling(&pool_path, "tmp");

		match fs::remove_file(&tmp_path) {
			Ok(()) => obs::log_warn!(path = %tmp_path.display(), "discarded interrupted compaction"),
			Err(e) if e.kind() == ErrorKind::NotFound => {},
			Err(e) => return Err(backend(format!("Failed to remove {}", tmp_path.display()), e)),
		}

		let snapshot = read_snapshot(&pool_path)?;
		let (taken, log_len) = replay_log(&log_path)?;
		let log_entries = taken.len();
		let taken = taken.into_iter().collect::<HashSet<_>>();
		let pool = snapshot.into_iter().filter(|key| !taken.contains(key)).collect::<VecDeque<_>>();
		let log = OpenOptions::new()
			.create(true)
			.append(true)
			.open(&log_path)
			.map_err(|e| backend(format!("Failed to open {}", log_path.display()), e))?;

		obs::log_info!(
			path = %pool_path.display(),
			remaining = pool.len(),
			issued_since_compaction = log_entries,
			"opened key pool"
		);

		Ok(Self {
			pool_path,
			log_path,
			tmp_path,
			pool,
			log,
			log_len,
			log_entries,
			compact_after: DEFAULT_COMPACT_AFTER,
			poisoned: false,
		})
	}

	fn record_taken(&mut self, key: &ActivationKey) -> Result<(), StoreError> {
		let line = format!("{}\n", key.expose());
		let written = self.log.write_all(line.as_bytes()).and_then(|()| self.log.sync_data());

		if let Err(e) = written {
			// Drop any partial line so the key is not considered issued after a restart.
			if let Err(rollback) = self.log.set_len(self.log_len) {
				self.poisoned = true;

				obs::log_warn!(error = %rollback, "failed to roll back issuance log");
			}

			return Err(backend(format!("Failed to append to {}", self.log_path.display()), e));
		}

		self.log_len += line.len() as u64;
		self.log_entries += 1;

		Ok(())
	}

	fn compact(&mut self, extra: &[ActivationKey]) -> Result<(), StoreError> {
		let mut contents = String::with_capacity((self.pool.len() + extra.len()) * 44);

		for key in self.pool.iter().chain(extra) {
			contents.push_str(key.expose());
			contents.push('\n');
		}

		if let Err(e) = write_atomically(&self.tmp_path, &self.pool_path, contents.as_bytes()) {
			let _ = fs::remove_file(&self.tmp_path);

			return Err(e);
		}

		match self.log.set_len(0).and_then(|()| self.log.sync_data()) {
			Ok(()) => {
				self.log_len = 0;
				self.log_entries = 0;
				self.poisoned = false;
			},
			// Stale log entries name keys that are no longer in the snapshot, so replay ignores them.
			Err(e) => {
				self.log_entries = 0;

				obs::log_warn!(error = %e, "failed to truncate issuance log");
			},
		}

		obs::log_debug!(remaining = self.pool.len() + extra.len(), "compacted key pool");

		Ok(())
	}
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
	let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();

	name.push(".");
	name.push(suffix);

	path.with_file_name(name)
}

fn backend(context: String, e: std::io::Error) -> StoreError {
	StoreError::Backend { message: format!("{context}: {e}") }
}

fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|e| {
			backend(format!("Failed to create store directory {}", parent.display()), e)
		})?;
	}

	Ok(())
}

fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
	match fs::read_to_string(path) {
		Ok(contents) => Ok(Some(contents)),
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
		Err(e) if e.kind() == ErrorKind::InvalidData => Err(StoreError::Corrupt {
			message: format!("{} is not valid UTF-8", path.display()),
		}),
		Err(e) => Err(backend(format!("Failed to read {}", path.display()), e)),
	}
}

fn parse_line(path: &Path, index: usize, line: &str) -> Result<ActivationKey, StoreError> {
	ActivationKey::parse(line).map_err(|e| StoreError::Corrupt {
		message: format!("{} line {}: {e}", path.display(), index + 1),
	})
}

fn read_snapshot(path: &Path) -> Result<Vec<ActivationKey>, StoreError> {
	let Some(contents) = read_optional(path)? else {
		return Ok(Vec::new());
	};
	let mut seen = HashSet::new();
	let mut keys = Vec::new();

	for (index, line) in contents.lines().enumerate().filter(|(_, line)| !line.is_empty()) {
		let key = parse_line(path, index, line)?;

		if !seen.insert(key.clone()) {
			return Err(StoreError::Corrupt {
				message: format!(
					"{} line {} repeats key {}",
					path.display(),
					index + 1,
					key.fingerprint()
				),
			});
		}

		keys.push(key);
	}

	Ok(keys)
}

/// Reads the issuance log, truncating a torn trailing line left by an interrupted append.
fn replay_log(path: &Path) -> Result<(Vec<ActivationKey>, u64), StoreError> {
	let Some(mut contents) = read_optional(path)? else {
		return Ok((Vec::new(), 0));
	};

	if !contents.is_empty() && !contents.ends_with('\n') {
		let keep = contents.rfind('\n').map_or(0, |i| i + 1);

		OpenOptions::new()
			.write(true)
			.open(path)
			.and_then(|file| {
				file.set_len(keep as u64)?;
				file.sync_data()
			})
			.map_err(|e| backend(format!("Failed to repair {}", path.display()), e))?;
		obs::log_warn!(path = %path.display(), "truncated torn issuance log entry");
		contents.truncate(keep);
	}

	let taken = contents
		.lines()
		.enumerate()
		.filter(|(_, line)| !line.is_empty())
		.map(|(index, line)| parse_line(path, index, line))
		.collect::<Result<Vec<_>, _>>()?;

	Ok((taken, contents.len() as u64))
}

fn write_atomically(tmp_path: &Path, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
	{
		let mut file = File::create(tmp_path)
			.map_err(|e| backend(format!("Failed to create {}", tmp_path.display()), e))?;

		file.write_all(bytes)
			.map_err(|e| backend(format!("Failed to write {}", tmp_path.display()), e))?;
		file.sync_all()
			.map_err(|e| backend(format!("Failed to sync {}", tmp_path.display()), e))?;
	}

	fs::rename(tmp_path, path)
		.map_err(|e| backend(format!("Failed to replace {}", path.display()), e))
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// crates.io
	use tokio::runtime::Runtime;
	// self
	use super::*;
	use crate::_preludet::{exposed, keys};

	fn temp_path(label: &str) -> PathBuf {
		let unique = format!(
			"keygate_file_store_{label}_{}_{}.txt",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	fn cleanup(path: &Path) {
		for file in [path.to_path_buf(), sibling(path, "taken"), sibling(path, "tmp")] {
			let _ = fs::remove_file(file);
		}
	}

	#[test]
	fn sibling_paths_extend_the_file_name() {
		let path = Path::new("/var/lib/keygate/keys.txt");

		assert_eq!(sibling(path, "taken"), Path::new("/var/lib/keygate/keys.txt.taken"));
		assert_eq!(sibling(path, "tmp"), Path::new("/var/lib/keygate/keys.txt.tmp"));
	}

	#[test]
	fn takes_are_logged_before_compaction() {
		let path = temp_path("log");
		let store = FileStore::open(&path).expect("Failed to open file store.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.append(keys(&["A", "B", "C"]))).expect("Append should succeed.");
		rt.block_on(store.take_one()).expect("Take should succeed.");

		assert_eq!(fs::read_to_string(&path).expect("snapshot"), "A\nB\nC\n");
		assert_eq!(fs::read_to_string(sibling(&path, "taken")).expect("log"), "A\n");

		store.compact().expect("Compaction should succeed.");

		assert_eq!(fs::read_to_string(&path).expect("snapshot"), "B\nC\n");
		assert_eq!(fs::read_to_string(sibling(&path, "taken")).expect("log"), "");

		cleanup(&path);
	}

	#[test]
	fn threshold_triggers_compaction() {
		let path = temp_path("threshold");
		let store = FileStore::open(&path).expect("Failed to open file store.").with_compact_after(2);
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.append(keys(&["A", "B", "C"]))).expect("Append should succeed.");
		rt.block_on(store.take_one()).expect("First take should succeed.");
		rt.block_on(store.take_one()).expect("Second take should succeed.");

		assert_eq!(fs::read_to_string(&path).expect("snapshot"), "C\n");
		assert_eq!(fs::read_to_string(sibling(&path, "taken")).expect("log"), "");

		cleanup(&path);
	}

	#[test]
	fn torn_log_entry_is_discarded_on_open() {
		let path = temp_path("torn");

		fs::write(&path, "A\nB\nC\n").expect("Failed to seed snapshot.");
		fs::write(sibling(&path, "taken"), "A\nB").expect("Failed to seed torn log.");

		let store = FileStore::open(&path).expect("Torn log should be repaired on open.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");
		let pool = rt.block_on(store.snapshot()).expect("Snapshot should succeed.");

		assert_eq!(exposed(&pool), ["B", "C"]);
		assert_eq!(fs::read_to_string(sibling(&path, "taken")).expect("log"), "A\n");

		let next = rt.block_on(store.take_one()).expect("Take after repair should succeed.");

		assert_eq!(next.expose(), "B");
		assert_eq!(fs::read_to_string(sibling(&path, "taken")).expect("log"), "A\nB\n");

		cleanup(&path);
	}

	#[test]
	fn leftover_temp_file_is_ignored() {
		let path = temp_path("tmp");

		fs::write(&path, "A\nB\n").expect("Failed to seed snapshot.");
		fs::write(sibling(&path, "tmp"), "A\n").expect("Failed to seed temp file.");

		let store = FileStore::open(&path).expect("Leftover temp file should not block open.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		assert_eq!(rt.block_on(store.remaining()), Ok(2));
		assert!(!sibling(&path, "tmp").exists());

		cleanup(&path);
	}

	#[test]
	fn stale_log_after_interrupted_truncation_is_harmless() {
		let path = temp_path("stale");

		// Snapshot already compacted, log not yet truncated.
		fs::write(&path, "C\n").expect("Failed to seed snapshot.");
		fs::write(sibling(&path, "taken"), "A\nB\n").expect("Failed to seed log.");

		let store = FileStore::open(&path).expect("Stale log should replay cleanly.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");
		let pool = rt.block_on(store.snapshot()).expect("Snapshot should succeed.");

		assert_eq!(exposed(&pool), ["C"]);

		cleanup(&path);
	}

	#[test]
	fn corrupt_snapshot_is_rejected() {
		let path = temp_path("corrupt");

		fs::write(&path, "A\nB/\n").expect("Failed to seed snapshot.");

		assert!(matches!(FileStore::open(&path), Err(StoreError::Corrupt { .. })));

		fs::write(&path, "A\nB\nA\n").expect("Failed to seed snapshot.");

		assert!(matches!(FileStore::open(&path), Err(StoreError::Corrupt { .. })));

		cleanup(&path);
	}

	#[test]
	fn failed_rollback_refuses_takes_until_compaction() {
		let path = temp_path("poison");
		let log_path = sibling(&path, "taken");
		let store = FileStore::open(&path).expect("Failed to open file store.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.append(keys(&["A", "B"]))).expect("Append should succeed.");

		// A read-only handle fails both the append and its rollback.
		store.inner.lock().log = File::open(&log_path).expect("Failed to reopen log read-only.");

		assert!(matches!(rt.block_on(store.take_one()), Err(StoreError::Backend { .. })));
		assert!(store.inner.lock().poisoned);

		store.inner.lock().log = OpenOptions::new()
			.append(true)
			.open(&log_path)
			.expect("Failed to reopen log for appending.");

		assert!(matches!(rt.block_on(store.take_one()), Err(StoreError::Backend { .. })));
		assert_eq!(rt.block_on(store.remaining()), Ok(2));

		store.compact().expect("Compaction should succeed.");

		assert!(!store.inner.lock().poisoned);
		assert_eq!(rt.block_on(store.take_one()).expect("Take should succeed.").expose(), "A");
		assert_eq!(fs::read_to_string(&log_path).expect("log"), "A\n");

		cleanup(&path);
	}

	#[test]
	fn failed_log_truncation_backs_off() {
		let path = temp_path("truncate");
		let log_path = sibling(&path, "taken");
		let store = FileStore::open(&path).expect("Failed to open file store.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.append(keys(&["A", "B", "C"]))).expect("Append should succeed.");
		rt.block_on(store.take_one()).expect("Take should succeed.");

		store.inner.lock().log = File::open(&log_path).expect("Failed to reopen log read-only.");
		store.compact().expect("Snapshot rewrite should succeed without log truncation.");

		{
			let guard = store.inner.lock();

			assert_eq!(guard.log_entries, 0);
			assert_eq!(guard.log_len, 2);
			assert!(!guard.poisoned);
		}

		assert_eq!(fs::read_to_string(&path).expect("snapshot"), "B\nC\n");
		assert_eq!(fs::read_to_string(&log_path).expect("log"), "A\n");

		drop(store);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store.");
		let pool = rt.block_on(reopened.snapshot()).expect("Snapshot should succeed.");

		assert_eq!(exposed(&pool), ["B", "C"]);

		cleanup(&path);
	}

	#[test]
	fn failed_compaction_keeps_the_take_and_backs_off() {
		let path = temp_path("compact_fail");
		let tmp_path = sibling(&path, "tmp");
		let store = FileStore::open(&path).expect("Failed to open file store.").with_compact_after(1);
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.append(keys(&["A", "B"]))).expect("Append should succeed.");
		// A directory in the temp slot makes every snapshot rewrite fail.
		fs::create_dir(&tmp_path).expect("Failed to block the temp path.");

		let taken = rt.block_on(store.take_one()).expect("Take should survive failed compaction.");

		assert_eq!(taken.expose(), "A");
		assert_eq!(store.inner.lock().log_entries, 0);
		assert_eq!(fs::read_to_string(&path).expect("snapshot"), "A\nB\n");
		assert_eq!(fs::read_to_string(sibling(&path, "taken")).expect("log"), "A\n");
		assert!(matches!(
			rt.block_on(store.append(keys(&["C"]))),
			Err(StoreError::Backend { .. })
		));
		assert_eq!(rt.block_on(store.remaining()), Ok(1));

		drop(store);
		fs::remove_dir(&tmp_path).expect("Failed to unblock the temp path.");

		let reopened = FileStore::open(&path).expect("Failed to reopen file store.");
		let pool = rt.block_on(reopened.snapshot()).expect("Snapshot should succeed.");

		assert_eq!(exposed(&pool), ["B"]);

		cleanup(&path);
	}

	#[test]
	fn unreadable_log_fails_open() {
		let path = temp_path("log_dir");
		let log_path = sibling(&path, "taken");

		fs::create_dir(&log_path).expect("Failed to place a directory at the log path.");

		assert!(matches!(FileStore::open(&path), Err(StoreError::Backend { .. })));

		fs::remove_dir(&log_path).expect("Failed to remove the log directory.");
		cleanup(&path);
	}

	#[test]
	fn duplicate_append_leaves_files_untouched() {
		let path = temp_path("dup");
		let store = FileStore::open(&path).expect("Failed to open file store.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.append(keys(&["A", "B"]))).expect("Append should succeed.");

		let outcome = rt.block_on(store.append(keys(&["C", "A"])));

		assert!(matches!(outcome, Err(StoreError::DuplicateKey { .. })));
		assert_eq!(fs::read_to_string(&path).expect("snapshot"), "A\nB\n");
		assert_eq!(rt.block_on(store.remaining()), Ok(2));

		cleanup(&path);
	}
}
