// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Exactly-once publication of map output files.
//!
//! A map task writes its output to temporary files and asks the coordinator
//! to publish them under their final names. Speculative and re-executed
//! attempts race on the same final names; the first attempt to publish wins
//! and every later attempt cleans up after itself and reports that it lost.
//! The only cross-attempt synchronization primitive is the atomic
//! rename-or-fail of the local filesystem; on filesystems without atomic
//! rename this protocol is unsound.

use std::fs;
use std::path::PathBuf;

use log::{debug, info, warn};
use parking_lot::Mutex;

/// One attempt's request to publish its output files.
///
/// Each entry pairs a temporary file with its final destination. Writers may
/// legitimately skip empty partitions, so temp files are allowed to be
/// missing.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    /// Shuffle the output belongs to.
    pub shuffle_id: u32,
    /// Map partition that produced the output.
    pub partition_id: u32,
    /// (temporary path, final path) pairs to publish.
    pub files: Vec<(PathBuf, PathBuf)>,
}

/// Publishes map output files, resolving duplicate-attempt races.
///
/// Commits are serialized behind one process-wide mutex. That is coarse, and
/// deliberately so: renames are cheap and commit races are rare, so finer
/// locking buys nothing.
#[derive(Debug, Default)]
pub struct OutputCommitCoordinator {
    lock: Mutex<()>,
}

impl OutputCommitCoordinator {
    /// Creates a coordinator for this executor process.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to publish the request's files, returning `true` iff this
    /// attempt's files became the canonical output.
    ///
    /// A filesystem error demotes a would-be winner to `false` and is never
    /// raised: the caller retries the whole map task, not the commit, and
    /// treats "lost the race" and "I/O failure" identically. Call this
    /// exactly once per finishing map-task attempt.
    pub fn commit(&self, request: &CommitRequest) -> bool {
        let _guard = self.lock.lock();

        let surviving: Vec<&(PathBuf, PathBuf)> = request
            .files
            .iter()
            .filter(|(temp, _)| temp.exists())
            .collect();

        if surviving.is_empty() {
            debug!(
                "shuffle {} partition {}: nothing to commit",
                request.shuffle_id, request.partition_id
            );
            return true;
        }

        // First write wins: if every destination exists, a concurrent attempt
        // already published this partition and our files are redundant.
        if surviving.iter().all(|(_, dest)| dest.exists()) {
            for (temp, _) in &surviving {
                if let Err(e) = fs::remove_file(temp) {
                    warn!(
                        "shuffle {} partition {}: failed to remove redundant temp file {}: {e}",
                        request.shuffle_id,
                        request.partition_id,
                        temp.display()
                    );
                }
            }
            info!(
                "shuffle {} partition {}: output already committed by a concurrent attempt",
                request.shuffle_id, request.partition_id
            );
            return false;
        }

        let mut published: Vec<&PathBuf> = Vec::with_capacity(surviving.len());
        for (temp, dest) in &surviving {
            if dest.exists() {
                if let Err(e) = fs::remove_file(dest) {
                    warn!(
                        "shuffle {} partition {}: failed to replace {}: {e}",
                        request.shuffle_id,
                        request.partition_id,
                        dest.display()
                    );
                    Self::roll_back(request, &published);
                    return false;
                }
            }
            if let Err(e) = fs::rename(temp, dest) {
                warn!(
                    "shuffle {} partition {}: failed to rename {} to {}: {e}",
                    request.shuffle_id,
                    request.partition_id,
                    temp.display(),
                    dest.display()
                );
                Self::roll_back(request, &published);
                return false;
            }
            published.push(dest);
        }
        true
    }

    /// Removes the destinations this request managed to publish, so a failed
    /// commit never leaves a partial set behind.
    fn roll_back(request: &CommitRequest, published: &[&PathBuf]) {
        for dest in published {
            if let Err(e) = fs::remove_file(dest) {
                warn!(
                    "shuffle {} partition {}: failed to roll back {}: {e}",
                    request.shuffle_id,
                    request.partition_id,
                    dest.display()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        fs::write(path, contents).unwrap();
    }

    fn request(
        shuffle_id: u32,
        partition_id: u32,
        files: Vec<(PathBuf, PathBuf)>,
    ) -> CommitRequest {
        CommitRequest {
            shuffle_id,
            partition_id,
            files,
        }
    }

    #[test]
    fn single_attempt_commits() {
        let dir = TempDir::new().unwrap();
        let temp = dir.path().join("out.data.tmp");
        let dest = dir.path().join("out.data");
        write(&temp, "payload");

        let coordinator = OutputCommitCoordinator::new();
        assert!(coordinator.commit(&request(1, 0, vec![(temp.clone(), dest.clone())])));

        assert!(!temp.exists());
        assert_eq!("payload", fs::read_to_string(&dest).unwrap());
    }

    #[test]
    fn first_write_wins_in_either_order() {
        for winner_first in [true, false] {
            let dir = TempDir::new().unwrap();
            let dest_data = dir.path().join("out.data");
            let dest_index = dir.path().join("out.index");

            let first_files: Vec<(PathBuf, PathBuf)> = vec![
                (dir.path().join("a.data.tmp"), dest_data.clone()),
                (dir.path().join("a.index.tmp"), dest_index.clone()),
            ];
            let second_files: Vec<(PathBuf, PathBuf)> = vec![
                (dir.path().join("b.data.tmp"), dest_data.clone()),
                (dir.path().join("b.index.tmp"), dest_index.clone()),
            ];
            for (temp, _) in &first_files {
                write(temp, "first");
            }
            for (temp, _) in &second_files {
                write(temp, "second");
            }

            let coordinator = OutputCommitCoordinator::new();
            let (req_a, req_b) = if winner_first {
                (request(1, 3, first_files), request(1, 3, second_files))
            } else {
                (request(1, 3, second_files), request(1, 3, first_files))
            };
            let first_outcome = coordinator.commit(&req_a);
            let second_outcome = coordinator.commit(&req_b);

            assert!(first_outcome);
            assert!(!second_outcome);
            // winner's content survived
            let expected = if winner_first { "first" } else { "second" };
            assert_eq!(expected, fs::read_to_string(&dest_data).unwrap());
            assert_eq!(expected, fs::read_to_string(&dest_index).unwrap());
            // every temp file from both attempts is gone
            for (temp, _) in req_a.files.iter().chain(req_b.files.iter()) {
                assert!(!temp.exists(), "{} survived", temp.display());
            }
        }
    }

    #[test]
    fn missing_temp_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let missing_temp = dir.path().join("never-written.tmp");
        let temp = dir.path().join("out.data.tmp");
        let dest_missing = dir.path().join("never-written");
        let dest = dir.path().join("out.data");
        write(&temp, "payload");

        let coordinator = OutputCommitCoordinator::new();
        assert!(coordinator.commit(&request(
            2,
            1,
            vec![
                (missing_temp, dest_missing.clone()),
                (temp, dest.clone())
            ]
        )));

        assert!(!dest_missing.exists());
        assert_eq!("payload", fs::read_to_string(&dest).unwrap());
    }

    #[test]
    fn rename_failure_demotes_and_rolls_back() {
        let dir = TempDir::new().unwrap();
        let temp_ok = dir.path().join("ok.tmp");
        let dest_ok = dir.path().join("ok.data");
        let temp_bad = dir.path().join("bad.tmp");
        // a non-empty directory cannot be replaced by remove_file or rename
        let dest_bad = dir.path().join("bad.data");
        fs::create_dir(&dest_bad).unwrap();
        write(&dest_bad.join("occupant"), "x");
        write(&temp_ok, "payload");
        write(&temp_bad, "payload");

        let coordinator = OutputCommitCoordinator::new();
        let outcome = coordinator.commit(&request(
            3,
            2,
            vec![
                (temp_ok.clone(), dest_ok.clone()),
                (temp_bad.clone(), dest_bad.clone()),
            ],
        ));

        assert!(!outcome);
        // the partially published file was rolled back
        assert!(!dest_ok.exists());
    }

    #[test]
    fn empty_request_commits_trivially() {
        let coordinator = OutputCommitCoordinator::new();
        assert!(coordinator.commit(&request(4, 0, vec![])));
    }
}
