use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::{corpus::QuestionSet, error::Result};

const VECTORS: TableDefinition<u64, &[u8]> = TableDefinition::new("vectors");
const META: TableDefinition<&str, &str> = TableDefinition::new("meta");

const FINGERPRINT_KEY: &str = "corpus_fingerprint";

/// Header size: 4 bytes dimension (u32 LE).
const HEADER_SIZE: usize = 4;

/// Stores one embedding vector per canonical question, keyed by the
/// question's numeric id.
///
/// Binary format per entry:
/// - 4 bytes: dimension D (u32 LE)
/// - D * 4 bytes: f32 LE values
///
/// A fingerprint over (encoder id, question texts) is kept alongside the
/// vectors; when it changes the cache is stale and must be cleared, so
/// vectors are recomputed only when the corpus or encoder actually changes.
pub struct VectorCache {
    db: Database,
}

impl VectorCache {
    /// Open or create a vector cache at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(VECTORS)?;
        txn.open_table(META)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Store a vector for a question.
    pub fn store(&self, question_id: u64, vector: &[f32]) -> Result<()> {
        self.batch_store(&[(question_id, vector.to_vec())])
    }

    /// Store multiple vectors in a single transaction.
    pub fn batch_store(&self, entries: &[(u64, Vec<f32>)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(VECTORS)?;
            for (question_id, vector) in entries {
                let byte_len =
                    HEADER_SIZE + std::mem::size_of_val(vector.as_slice());
                let mut guard =
                    table.insert_reserve(*question_id, byte_len)?;
                let dest = guard.as_mut();

                let dimension = vector.len() as u32;
                dest[0..4].copy_from_slice(&dimension.to_le_bytes());
                dest[HEADER_SIZE..]
                    .copy_from_slice(bytemuck::cast_slice(vector));
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Retrieve the vector for a question, or None if not cached.
    ///
    /// Entries with a corrupt length are treated as missing.
    pub fn load(&self, question_id: u64) -> Result<Option<Vec<f32>>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(VECTORS)?;

        let Some(guard) = table.get(question_id)? else {
            return Ok(None);
        };

        let bytes = guard.value();
        if bytes.len() < HEADER_SIZE {
            return Ok(None);
        }

        let dimension = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let expected_len = HEADER_SIZE + (dimension as usize) * 4;
        if bytes.len() != expected_len {
            return Ok(None);
        }

        let vector: Vec<f32> =
            bytemuck::pod_collect_to_vec(&bytes[HEADER_SIZE..]);
        Ok(Some(vector))
    }

    /// Number of cached vectors.
    pub fn len(&self) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(VECTORS)?;
        let mut count = 0;
        for entry in table.iter()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The fingerprint the cached vectors were computed under, if any.
    pub fn fingerprint(&self) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(META)?;
        Ok(table.get(FINGERPRINT_KEY)?.map(|v| v.value().to_string()))
    }

    /// Drop all cached vectors and record the fingerprint they will be
    /// recomputed under.
    pub fn reset(&self, fingerprint: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            txn.delete_table(VECTORS)?;
            txn.open_table(VECTORS)?;
            let mut meta = txn.open_table(META)?;
            meta.insert(FINGERPRINT_KEY, fingerprint)?;
        }
        txn.commit()?;
        Ok(())
    }
}

impl std::fmt::Debug for VectorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorCache").finish_non_exhaustive()
    }
}

/// Fingerprint over the encoder identity and every canonical question text,
/// in corpus order.
pub fn corpus_fingerprint(encoder_id: &str, questions: &QuestionSet) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(encoder_id.as_bytes());
    hasher.update(&[0]);
    for question in questions.iter() {
        hasher.update(question.text.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}
