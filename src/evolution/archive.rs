//! Hall of fame and on-disk run archive.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::robot::Individual;
use crate::schema::{
    EvolutionHistory, EvolutionResult, EvolutionStats, GenerationRecord, GenomeDescription,
    IndividualSnapshot, RunSpec,
};

/// Best individuals seen so far, best first, at most one entry per id.
#[derive(Debug, Clone, Default)]
pub struct HallOfFame {
    capacity: usize,
    members: Vec<IndividualSnapshot>,
}

impl HallOfFame {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            members: Vec::with_capacity(capacity),
        }
    }

    /// Offer a batch of evaluated individuals.
    pub fn update<'a>(&mut self, batch: impl IntoIterator<Item = &'a Individual>) {
        for individual in batch {
            if !individual.is_evaluated() || self.contains(individual.id) {
                continue;
            }
            let qualifies = self.members.len() < self.capacity
                || self
                    .members
                    .last()
                    .is_some_and(|worst| individual.fitness > worst.fitness);
            if !qualifies {
                continue;
            }
            let position = self
                .members
                .iter()
                .position(|m| individual.fitness > m.fitness)
                .unwrap_or(self.members.len());
            self.members.insert(position, individual.to_snapshot());
            self.members.truncate(self.capacity);
        }
    }

    pub fn contains(&self, id: u64) -> bool {
        self.members.iter().any(|m| m.id == id)
    }

    pub fn best(&self) -> Option<&IndividualSnapshot> {
        self.members.first()
    }

    pub fn members(&self) -> &[IndividualSnapshot] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }
}

/// Archive I/O errors.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

const SPECS_FILE: &str = "specs.json";
const STATS_FILE: &str = "stats.json";
const HALL_OF_FAME_FILE: &str = "hall_of_fame.json";
const LAST_GENERATION_FILE: &str = "last_generation.json";
const HISTORY_FILE: &str = "history.json";
const BEST_OF_EACH_GEN_FILE: &str = "best_of_each_gen.json";

/// Directory holding the artifacts of one run.
#[derive(Debug, Clone)]
pub struct RunArchive {
    dir: PathBuf,
}

impl RunArchive {
    /// Create the next free `run_<n>` directory below `base`.
    pub fn create<P: AsRef<Path>>(base: P) -> Result<Self, ArchiveError> {
        let dir = allocate_run_dir(base.as_ref())?;
        Ok(Self { dir })
    }

    /// Archive backed by an existing run directory.
    pub fn open<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write every artifact of a finished run.
    pub fn save(&self, result: &EvolutionResult) -> Result<(), ArchiveError> {
        write_json(&self.dir.join(SPECS_FILE), &result.spec)?;
        write_json(&self.dir.join(STATS_FILE), &result.stats)?;
        write_json(&self.dir.join(HALL_OF_FAME_FILE), &result.hall_of_fame)?;
        write_json(&self.dir.join(LAST_GENERATION_FILE), &result.population)?;
        write_json(&self.dir.join(HISTORY_FILE), &result.history.records)?;
        write_json(
            &self.dir.join(BEST_OF_EACH_GEN_FILE),
            &result.history.best_of_each_gen,
        )?;
        info!("Saved run to {}", self.dir.display());
        Ok(())
    }

    /// Read a run back.
    pub fn load(&self) -> Result<EvolutionResult, ArchiveError> {
        let spec: RunSpec = read_json(&self.dir.join(SPECS_FILE))?;
        let stats: EvolutionStats = read_json(&self.dir.join(STATS_FILE))?;
        let hall_of_fame: Vec<IndividualSnapshot> =
            read_json(&self.dir.join(HALL_OF_FAME_FILE))?;
        let population: Vec<IndividualSnapshot> =
            read_json(&self.dir.join(LAST_GENERATION_FILE))?;
        let records: Vec<GenerationRecord> = read_json(&self.dir.join(HISTORY_FILE))?;
        let best_of_each_gen: Vec<IndividualSnapshot> =
            read_json(&self.dir.join(BEST_OF_EACH_GEN_FILE))?;

        Ok(EvolutionResult {
            spec,
            population,
            hall_of_fame,
            history: EvolutionHistory {
                records,
                best_of_each_gen,
            },
            stats,
        })
    }
}

/// Create `base/run_<n>` with `n` one past the highest existing run.
pub fn allocate_run_dir(base: &Path) -> Result<PathBuf, ArchiveError> {
    fs::create_dir_all(base).map_err(io_error(base))?;

    let mut next = 1;
    for entry in fs::read_dir(base).map_err(io_error(base))? {
        let entry = entry.map_err(io_error(base))?;
        let name = entry.file_name();
        let number = name
            .to_str()
            .and_then(|name| name.strip_prefix("run_"))
            .and_then(|n| n.parse::<usize>().ok());
        if let Some(number) = number {
            next = next.max(number + 1);
        }
    }

    let dir = base.join(format!("run_{next}"));
    fs::create_dir(&dir).map_err(io_error(&dir))?;
    Ok(dir)
}

/// Load a genome description from a JSON file.
pub fn load_genome<P: AsRef<Path>>(path: P) -> Result<GenomeDescription, ArchiveError> {
    read_json(path.as_ref())
}

/// Save a genome description as JSON.
pub fn save_genome<P: AsRef<Path>>(
    path: P,
    genome: &GenomeDescription,
) -> Result<(), ArchiveError> {
    write_json(path.as_ref(), genome)
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + use<> {
    let path = path.to_path_buf();
    move |source| ArchiveError::Io { path, source }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ArchiveError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| ArchiveError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(io_error(path))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArchiveError> {
    let content = fs::read_to_string(path).map_err(io_error(path))?;
    serde_json::from_str(&content).map_err(|source| ArchiveError::Json {
        path: path.to_path_buf(),
        source,
    })
}
