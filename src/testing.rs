//! In-process stand-ins for the registry and the release registrar.

use anyhow::{bail, Result};
use std::cell::RefCell;

use crate::release::{ReleaseRegistrar, ReleaseRequest};
use crate::upload::{Transfer, TransferRequest, TransferResponse};

const CREATED_BODY: &str = "HTTP/1.1 201 Created\r\nContent-Type: application/json\r\n\r\n{\"message\":\"201 Created\"}";

/// Records every target URL and replies with a canned response.
///
/// A response can be scripted for the n-th transfer with [`Self::fail_at`].
pub struct FakeTransfer {
    default: TransferResponse,
    failure: Option<(usize, TransferResponse)>,
    calls: RefCell<Vec<String>>,
}

impl FakeTransfer {
    pub fn created() -> Self {
        Self::responding(Some(0), CREATED_BODY)
    }

    pub fn responding(exit_code: Option<i32>, output: &str) -> Self {
        Self {
            default: TransferResponse {
                exit_code,
                output: output.to_string(),
            },
            failure: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Reply to the transfer with zero-based index `index` with `output`.
    pub fn fail_at(mut self, index: usize, output: &str) -> Self {
        self.failure = Some((
            index,
            TransferResponse {
                exit_code: Some(0),
                output: output.to_string(),
            },
        ));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl Transfer for FakeTransfer {
    fn transfer(&self, request: &TransferRequest<'_>) -> Result<TransferResponse> {
        let mut calls = self.calls.borrow_mut();
        let index = calls.len();
        calls.push(request.target.to_string());
        match &self.failure {
            Some((at, response)) if *at == index => Ok(response.clone()),
            _ => Ok(self.default.clone()),
        }
    }
}

/// Records release requests; optionally fails with a status.
#[derive(Default)]
pub struct FakeRegistrar {
    pub fail_with: Option<i32>,
    requests: RefCell<Vec<ReleaseRequest>>,
}

impl FakeRegistrar {
    pub fn failing(code: i32) -> Self {
        Self {
            fail_with: Some(code),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ReleaseRequest> {
        self.requests.borrow().clone()
    }
}

impl ReleaseRegistrar for FakeRegistrar {
    fn create_release(&self, request: &ReleaseRequest) -> Result<()> {
        self.requests.borrow_mut().push(request.clone());
        if let Some(code) = self.fail_with {
            bail!("fake registrar exited with status {code}");
        }
        Ok(())
    }
}
