use super::*;
use lru::LruCache;
use std::{
    collections::HashMap,
    num::NonZeroUsize,
    path::PathBuf,
    sync::Mutex,
};

const BUNDLE_CACHE_CAPACITY: usize = 1024;

/// The persistent bundle store.
///
/// Bundle blobs live on disk, named by the SHA-1 of their full bundle id and
/// fsynced before a push is acknowledged; the item index is rebuilt from the
/// blobs by [`Store::recover`] on startup. A blob is written once and never
/// mutated. The item map is the single serialisation point for metadata.
pub struct Store {
    root: PathBuf,
    items: Mutex<HashMap<String, BundleItem>>,
    cache: Mutex<LruCache<String, Bundle>>,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            items: Mutex::new(HashMap::new()),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(BUNDLE_CACHE_CAPACITY).unwrap(),
            )),
        })
    }

    /// Persist a bundle and upsert its item.
    ///
    /// The blob is durable on disk before the item becomes queryable. Pushing
    /// a fragment of a known bundle adds a part only if its
    /// `(offset, total length)` pair is novel.
    pub async fn push(&self, bundle: &Bundle) -> Result<BundleItem> {
        let full_id = bundle.id();
        let key = full_id.scrub().to_string();

        let part = BundlePart {
            filename: blob_name(&full_id),
            fragment_offset: full_id.fragment_info.as_ref().map_or(0, |f| f.offset),
            total_data_length: full_id.fragment_info.as_ref().map_or(0, |f| f.total_len),
        };

        let novel = match self.items.lock().expect("item map lock poisoned").get(&key) {
            Some(item) => !item.parts.iter().any(|p| {
                (p.fragment_offset, p.total_data_length)
                    == (part.fragment_offset, part.total_data_length)
            }),
            None => true,
        };
        if !novel {
            trace!("part of {key} already stored");
            return self.query_id(&key);
        }

        write_blob(self.root.clone(), part.filename.clone(), bundle.emit()).await?;

        self.cache
            .lock()
            .expect("bundle cache lock poisoned")
            .put(part.filename.clone(), bundle.clone());

        let mut items = self.items.lock().expect("item map lock poisoned");
        let item = match items.entry(key.clone()) {
            std::collections::hash_map::Entry::Occupied(mut e) => {
                let item = e.get_mut();
                if !item.parts.iter().any(|p| {
                    (p.fragment_offset, p.total_data_length)
                        == (part.fragment_offset, part.total_data_length)
                }) {
                    item.parts.push(part);
                }
                item.clone()
            }
            std::collections::hash_map::Entry::Vacant(e) => e
                .insert(BundleItem {
                    id: key,
                    bundle_id: full_id.scrub(),
                    pending: false,
                    expires: expiration_date(bundle),
                    fragmented: bundle.primary.has_fragmentation(),
                    parts: vec![part],
                    pack: pack::PackState::default(),
                })
                .clone(),
        };
        Ok(item)
    }

    pub fn query_id(&self, id: &str) -> Result<BundleItem> {
        self.items
            .lock()
            .expect("item map lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn query_pending(&self) -> Vec<BundleItem> {
        self.items
            .lock()
            .expect("item map lock poisoned")
            .values()
            .filter(|i| i.pending)
            .cloned()
            .collect()
    }

    pub fn query_expired(&self, now: time::OffsetDateTime) -> Vec<BundleItem> {
        self.items
            .lock()
            .expect("item map lock poisoned")
            .values()
            .filter(|i| i.expires <= now)
            .cloned()
            .collect()
    }

    pub fn update(&self, item: BundleItem) -> Result<()> {
        match self
            .items
            .lock()
            .expect("item map lock poisoned")
            .get_mut(&item.id)
        {
            Some(stored) => {
                *stored = item;
                Ok(())
            }
            None => Err(Error::NotFound(item.id)),
        }
    }

    /// Remove an item and its blobs.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let item = self
            .items
            .lock()
            .expect("item map lock poisoned")
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        for part in item.parts {
            self.cache
                .lock()
                .expect("bundle cache lock poisoned")
                .pop(&part.filename);

            match tokio::fs::remove_file(self.root.join(&part.filename)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!("blob {} was already gone", part.filename);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Load and decode the bundle blob behind a part.
    pub async fn load(&self, part: &BundlePart) -> Result<Bundle> {
        if let Some(bundle) = self
            .cache
            .lock()
            .expect("bundle cache lock poisoned")
            .get(&part.filename)
        {
            return Ok(bundle.clone());
        }

        let data = tokio::fs::read(self.root.join(&part.filename)).await?;
        let bundle = Bundle::parse(&data)?;

        self.cache
            .lock()
            .expect("bundle cache lock poisoned")
            .put(part.filename.clone(), bundle.clone());

        Ok(bundle)
    }

    /// Rebuild the item index from the blobs in the storage directory.
    /// Returns the recovered items so the caller can re-run the pipeline.
    pub async fn recover(&self) -> Result<Vec<BundleItem>> {
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();

            // leftovers from interrupted writes
            if path.extension().is_some_and(|e| e == "tmp") {
                let _ = tokio::fs::remove_file(&path).await;
                continue;
            }

            let data = tokio::fs::read(&path).await?;
            let bundle = match Bundle::parse(&data) {
                Ok(bundle) => bundle,
                Err(e) => {
                    warn!("dropping undecodable blob {}: {e}", path.display());
                    let _ = tokio::fs::remove_file(&path).await;
                    continue;
                }
            };

            let full_id = bundle.id();
            let key = full_id.scrub().to_string();
            let part = BundlePart {
                filename: blob_name(&full_id),
                fragment_offset: full_id.fragment_info.as_ref().map_or(0, |f| f.offset),
                total_data_length: full_id.fragment_info.as_ref().map_or(0, |f| f.total_len),
            };

            let mut items = self.items.lock().expect("item map lock poisoned");
            match items.entry(key.clone()) {
                std::collections::hash_map::Entry::Occupied(mut e) => {
                    e.get_mut().parts.push(part);
                }
                std::collections::hash_map::Entry::Vacant(e) => {
                    e.insert(BundleItem {
                        id: key,
                        bundle_id: full_id.scrub(),
                        pending: false,
                        expires: expiration_date(&bundle),
                        fragmented: bundle.primary.has_fragmentation(),
                        parts: vec![part],
                        pack: pack::PackState::default(),
                    });
                }
            }
        }

        let items = self
            .items
            .lock()
            .expect("item map lock poisoned")
            .values()
            .cloned()
            .collect::<Vec<_>>();
        if !items.is_empty() {
            info!("recovered {} bundles from storage", items.len());
        }
        Ok(items)
    }
}

/// Write a blob with create-only + 0600, fsync it, then rename into place.
async fn write_blob(root: PathBuf, filename: String, data: Vec<u8>) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        use std::io::Write;

        let final_path = root.join(&filename);
        let tmp_path = root.join(format!("{filename}.tmp"));

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&tmp_path)?;
        if let Err(e) = file.write_all(&data).and_then(|_| file.sync_all()) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }
        drop(file);

        if let Err(e) = std::fs::rename(&tmp_path, &final_path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }
        Ok(())
    })
    .await
    .expect("blob write task panicked")
    .map_err(Error::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mule_bpv7::{builder::Builder, creation_timestamp::CreationTimestamp, dtn_time::DtnTime};

    fn timestamp(seq: u64) -> CreationTimestamp {
        CreationTimestamp {
            creation_time: DtnTime::now(),
            sequence_number: seq,
        }
    }

    fn test_bundle(seq: u64) -> Bundle {
        Builder::new()
            .source("dtn://node-a/".parse().unwrap())
            .destination("dtn://node-b/app".parse().unwrap())
            .lifetime(3_600_000_000)
            .payload(b"payload".to_vec())
            .build(timestamp(seq))
    }

    fn fragment(ts: CreationTimestamp, offset: u64, total_len: u64, payload: Vec<u8>) -> Bundle {
        let mut bundle = Builder::new()
            .source("dtn://node-a/".parse().unwrap())
            .destination("dtn://node-b/app".parse().unwrap())
            .lifetime(3_600_000_000)
            .payload(payload)
            .build(ts);
        bundle.primary.flags.is_fragment = true;
        bundle.primary.fragment_info =
            Some(bpv7::bundle_id::FragmentInfo { offset, total_len });
        bundle
    }

    #[tokio::test]
    async fn push_is_durable_and_queryable() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();

        let bundle = test_bundle(1);
        let item = store.push(&bundle).await.unwrap();
        assert_eq!(item.id, bundle.id().scrub().to_string());
        assert!(!item.pending);
        assert!(!item.fragmented);
        assert_eq!(item.parts.len(), 1);

        // blob is on disk with the sha1-derived name
        let blob = dir.path().join(&item.parts[0].filename);
        assert!(blob.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&blob).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let loaded = store.load(&item.parts[0]).await.unwrap();
        assert_eq!(loaded, bundle);
    }

    #[tokio::test]
    async fn duplicate_push_does_not_add_parts() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();

        let bundle = test_bundle(1);
        store.push(&bundle).await.unwrap();
        let item = store.push(&bundle).await.unwrap();
        assert_eq!(item.parts.len(), 1);
    }

    #[tokio::test]
    async fn fragments_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();

        let ts = timestamp(9);
        let a = fragment(ts, 0, 1000, vec![0xAA; 500]);
        let b = fragment(ts, 500, 1000, vec![0xBB; 500]);
        assert_eq!(a.id().scrub(), b.id().scrub());

        store.push(&a).await.unwrap();
        let item = store.push(&b).await.unwrap();
        assert!(item.fragmented);
        assert_eq!(item.parts.len(), 2);

        // the same fragment again is not a new part
        let item = store.push(&a).await.unwrap();
        assert_eq!(item.parts.len(), 2);
    }

    #[tokio::test]
    async fn pending_and_expired_queries() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();

        let bundle = test_bundle(1);
        let mut item = store.push(&bundle).await.unwrap();
        assert!(store.query_pending().is_empty());

        item.pending = true;
        store.update(item).unwrap();
        assert_eq!(store.query_pending().len(), 1);

        let now = time::OffsetDateTime::now_utc();
        assert!(store.query_expired(now).is_empty());
        assert_eq!(
            store.query_expired(now + time::Duration::hours(2)).len(),
            1
        );
    }

    #[tokio::test]
    async fn delete_removes_item_and_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();

        let bundle = test_bundle(1);
        let item = store.push(&bundle).await.unwrap();
        let blob = dir.path().join(&item.parts[0].filename);

        store.delete(&item.id).await.unwrap();
        assert!(!blob.exists());
        assert!(matches!(
            store.query_id(&item.id),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            store.delete(&item.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn recover_rebuilds_items_from_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = test_bundle(1);
        let fragment = fragment(timestamp(9), 0, 1000, vec![0xAA; 100]);
        {
            let store = Store::new(dir.path()).unwrap();
            store.push(&bundle).await.unwrap();
            store.push(&fragment).await.unwrap();
        }

        let store = Store::new(dir.path()).unwrap();
        let items = store.recover().await.unwrap();
        assert_eq!(items.len(), 2);

        let item = store.query_id(&bundle.id().scrub().to_string()).unwrap();
        let loaded = store.load(&item.parts[0]).await.unwrap();
        assert_eq!(loaded, bundle);
    }
}
