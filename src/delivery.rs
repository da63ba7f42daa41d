//! Marshals parsed responses and errors onto the callback context.
//!
//! The injectable seam is [`DeliveryExecutor`]: anything that can run a
//! boxed task, typically by posting it to the application's main thread.
//! [`ExecutorDelivery`] builds the per-request delivery task on top of an
//! executor and enforces the ordering rules: the cancellation re-check at
//! execution time, at most one terminal delivery, and the completion hook
//! that runs strictly after the listener callback.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};

use crate::error::RequestError;
use crate::request::erased::{ErasedResponse, SharedRequest};

/// A unit of work to run on the callback context.
pub type DeliveryTask = Box<dyn FnOnce() + Send>;

/// Callback context abstraction. Implementations decide where delivery
/// tasks run; the engine only requires that tasks submitted for one
/// request execute in submission order.
pub trait DeliveryExecutor: Send + Sync {
    /// Submit a task. Must not block.
    fn execute(&self, task: DeliveryTask);
}

/// Runs tasks directly on the submitting thread. Useful in tests and in
/// applications that already marshal callbacks themselves.
#[derive(Debug, Default)]
pub struct InlineExecutor;

impl DeliveryExecutor for InlineExecutor {
    fn execute(&self, task: DeliveryTask) {
        task();
    }
}

/// The default callback context: a dedicated thread draining a task
/// channel in submission order.
pub struct DeliveryThread {
    sender: Option<Sender<DeliveryTask>>,
    handle: Option<JoinHandle<()>>,
}

impl DeliveryThread {
    /// Spawn the delivery thread.
    pub fn spawn() -> std::io::Result<Self> {
        let (sender, receiver) = unbounded::<DeliveryTask>();
        let handle = std::thread::Builder::new()
            .name("quiver-delivery".to_string())
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    task();
                }
                log::debug!("delivery thread exiting");
            })?;
        Ok(Self { sender: Some(sender), handle: Some(handle) })
    }
}

impl DeliveryExecutor for DeliveryThread {
    fn execute(&self, task: DeliveryTask) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(task);
        }
    }
}

impl Drop for DeliveryThread {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what is already
        // queued and exit.
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Crate-internal delivery contract used by the dispatchers.
pub(crate) trait ResponseDelivery: Send + Sync {
    /// Deliver a parsed response.
    fn post_response(&self, request: SharedRequest, response: ErasedResponse);

    /// Deliver a parsed response, then run `on_complete` on the delivery
    /// context after the listener callback returns.
    fn post_response_then(
        &self,
        request: SharedRequest,
        response: ErasedResponse,
        on_complete: DeliveryTask,
    );

    /// Deliver a terminal error through the same channel.
    fn post_error(&self, request: SharedRequest, error: RequestError);
}

/// [`ResponseDelivery`] over an injected [`DeliveryExecutor`].
pub(crate) struct ExecutorDelivery {
    executor: Arc<dyn DeliveryExecutor>,
}

impl ExecutorDelivery {
    pub(crate) fn new(executor: Arc<dyn DeliveryExecutor>) -> Self {
        Self { executor }
    }

    fn submit(
        &self,
        request: SharedRequest,
        outcome: Result<ErasedResponse, RequestError>,
        on_complete: Option<DeliveryTask>,
    ) {
        self.executor.execute(Box::new(move || {
            run_delivery(request, outcome, on_complete);
        }));
    }
}

impl ResponseDelivery for ExecutorDelivery {
    fn post_response(&self, request: SharedRequest, response: ErasedResponse) {
        request.mark_delivered();
        request.add_marker("post-response");
        self.submit(request, Ok(response), None);
    }

    fn post_response_then(
        &self,
        request: SharedRequest,
        response: ErasedResponse,
        on_complete: DeliveryTask,
    ) {
        request.mark_delivered();
        request.add_marker("post-response");
        self.submit(request, Ok(response), Some(on_complete));
    }

    fn post_error(&self, request: SharedRequest, error: RequestError) {
        request.add_marker("post-error");
        self.submit(request, Err(error), None);
    }
}

/// The delivery task body, shared by every posted outcome.
fn run_delivery(
    request: SharedRequest,
    outcome: Result<ErasedResponse, RequestError>,
    on_complete: Option<DeliveryTask>,
) {
    // The request may have been canceled between enqueue and execution;
    // this is the last point where the flag suppresses the listener.
    if request.is_canceled() {
        request.finish("canceled-at-delivery");
        return;
    }

    let intermediate = matches!(&outcome, Ok(response) if response.intermediate);
    match outcome {
        Ok(response) => request.deliver_response(response),
        Err(error) => request.deliver_error(error),
    }

    if intermediate {
        // A network refresh is still owed; the terminal delivery will
        // finish the request.
        request.add_marker("intermediate-response");
    } else {
        request.finish("done");
    }

    if let Some(task) = on_complete {
        task();
    }
}
