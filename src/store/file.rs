//! File-backed [`TokenStore`] so tokens survive process restarts.

// std
use std::{
	fs::{self, File},
	io::{self, Write},
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	store::{StoreError, StoreFuture, StoreKey, TokenStore},
};

type Snapshot = HashMap<StoreKey, AccessToken>;

/// Keeps every token in memory and mirrors the map to a JSON file on each mutation.
///
/// The snapshot is written to a sibling `.tmp` file, synced, then renamed into place, so
/// readers only ever observe a complete file.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	tokens: Arc<RwLock<Snapshot>>,
}
impl FileStore {
	/// Opens the snapshot at `path`, creating parent directories as needed.
	///
	/// A missing or blank file yields an empty store; unparsable contents are an error.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
			fs::create_dir_all(dir).map_err(io_failure("create directory", dir))?;
		}

		let tokens = read_snapshot(&path)?;

		Ok(Self { path, tokens: Arc::new(RwLock::new(tokens)) })
	}

	/// Snapshot location.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn write_snapshot(&self, tokens: &Snapshot) -> Result<(), StoreError> {
		let entries = tokens.iter().collect::<Vec<_>>();
		let bytes = serde_json::to_vec_pretty(&entries)
			.map_err(|e| StoreError::Serialization { message: format!("token snapshot: {e}") })?;
		let staging = self.path.with_extension("tmp");
		let mut file = File::create(&staging).map_err(io_failure("create", &staging))?;

		file.write_all(&bytes).map_err(io_failure("write", &staging))?;
		file.sync_all().map_err(io_failure("sync", &staging))?;
		drop(file);

		fs::rename(&staging, &self.path).map_err(io_failure("replace", &self.path))
	}
}
impl TokenStore for FileStore {
	fn save<'a>(&'a self, key: &'a StoreKey, token: AccessToken) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut tokens = self.tokens.write();

			tokens.insert(key.clone(), token);

			self.write_snapshot(&tokens)
		})
	}

	fn fetch<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, Option<AccessToken>> {
		Box::pin(async move { Ok(self.tokens.read().get(key).cloned()) })
	}

	fn remove<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, Option<AccessToken>> {
		Box::pin(async move {
			let mut tokens = self.tokens.write();
			let removed = tokens.remove(key);

			if removed.is_some() {
				self.write_snapshot(&tokens)?;
			}

			Ok(removed)
		})
	}
}

fn read_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
	let bytes = match fs::read(path) {
		Ok(bytes) => bytes,
		Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Snapshot::new()),
		Err(e) => return Err(io_failure("read", path)(e)),
	};

	if bytes.iter().all(u8::is_ascii_whitespace) {
		return Ok(Snapshot::new());
	}

	serde_json::from_slice::<Vec<(StoreKey, AccessToken)>>(&bytes)
		.map(|entries| entries.into_iter().collect())
		.map_err(|e| StoreError::Serialization { message: format!("{}: {e}", path.display()) })
}

fn io_failure(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> StoreError {
	let path = path.display().to_string();

	move |e| StoreError::Backend { message: format!("could not {action} {path}: {e}") }
}
