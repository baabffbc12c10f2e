// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use crate::job_engine::job::{Converted, JobError, Payload, Processor};

type ProcessFn = dyn Fn(&Payload) -> Result<Converted, JobError> + Send + Sync + 'static;

/// A processor backed by a closure. Handy for tests and one-off pools.
pub struct ClosureProcessor {
    desc: String,
    process_fn: Box<ProcessFn>,
}

impl ClosureProcessor {
    pub fn new(
        desc: impl Into<String>,
        f: impl Fn(&Payload) -> Result<Converted, JobError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            desc: desc.into(),
            process_fn: Box::new(f),
        }
    }
}

impl Processor for ClosureProcessor {
    fn desc(&self) -> &str {
        &self.desc
    }

    fn process(&self, payload: &Payload) -> Result<Converted, JobError> {
        (self.process_fn)(payload)
    }
}

impl std::fmt::Debug for ClosureProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureProcessor")
            .field("desc", &self.desc)
            .finish()
    }
}

/// Example usage
#[test]
pub fn example() {
    use crate::job_engine::pool::{PoolConfig, WorkerPool};
    use std::sync::Arc;
    use std::time::Duration;

    let pool = WorkerPool::start(
        PoolConfig {
            workers: 1,
            ..PoolConfig::default()
        },
        Arc::new(ClosureProcessor::new("uppercase", |payload: &Payload| {
            Ok(Converted {
                data: payload.data.to_ascii_uppercase(),
                output_name: payload.filename.to_uppercase(),
                content_type: "text/plain",
            })
        })),
    )
    .unwrap();

    let completed = futures::executor::block_on(
        pool.dispatcher()
            .handle(Payload::new("hello.txt", b"hello".to_vec())),
    )
    .unwrap();
    assert_eq!(completed.output.data, b"HELLO");
    assert_eq!(completed.output.output_name, "HELLO.TXT");

    futures::executor::block_on(pool.shutdown(Duration::from_secs(1))).unwrap();
}
