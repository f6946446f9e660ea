use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::capture::{CameraDevice, CaptureSource, CaptureState, CapturedImage};
use crate::error::StepError;
use crate::pipeline::{GeneratedImageResult, RedesignInstruction, SceneDescription};
use crate::workflow::client::RedesignApi;

/// Everything the user sees. Single slot: at most one image, one
/// description and one result are live at a time.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub captured: Option<CapturedImage>,
    pub description: Option<SceneDescription>,
    pub result: Option<GeneratedImageResult>,
    pub instruction: RedesignInstruction,
    pub error: Option<String>,
    pub in_flight: bool,
    pub capture_state: CaptureState,
    epoch: u64,
}

impl WorkflowState {
    fn initial(instruction: RedesignInstruction) -> Self {
        WorkflowState {
            captured: None,
            description: None,
            result: None,
            instruction,
            error: None,
            in_flight: false,
            capture_state: CaptureState::Idle,
            epoch: 0,
        }
    }

    pub fn can_generate(&self) -> bool {
        self.captured.is_some() && !self.in_flight
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateOutcome {
    Completed(GeneratedImageResult),
    Failed(StepError),
    /// The trigger was disabled: nothing captured or a sequence in flight.
    Ignored,
    /// A reset happened while the sequence was running; its result was dropped.
    Discarded,
}

pub struct WorkflowController {
    api: Arc<dyn RedesignApi>,
    capture: tokio::sync::Mutex<CaptureSource>,
    state: Mutex<WorkflowState>,
}

impl WorkflowController {
    pub fn new(
        api: Arc<dyn RedesignApi>,
        camera: Arc<dyn CameraDevice>,
        default_instruction: &str,
    ) -> Self {
        WorkflowController {
            api,
            capture: tokio::sync::Mutex::new(CaptureSource::new(camera)),
            state: Mutex::new(WorkflowState::initial(RedesignInstruction::new(
                default_instruction,
            ))),
        }
    }

    pub fn snapshot(&self) -> WorkflowState {
        self.state.lock().clone()
    }

    pub fn set_instruction(&self, text: &str) {
        self.state.lock().instruction = RedesignInstruction::new(text);
    }

    fn sync_capture_state(&self, source: &CaptureSource) {
        self.state.lock().capture_state = source.state();
    }

    fn record_error(&self, err: &StepError) {
        self.state.lock().error = Some(err.to_string());
    }

    fn store_capture(&self, image: CapturedImage, source: &CaptureSource) {
        let mut state = self.state.lock();
        state.captured = Some(image);
        state.description = None;
        state.error = None;
        state.capture_state = source.state();
    }

    pub async fn load_file(&self, path: &Path) -> Result<(), StepError> {
        let mut source = self.capture.lock().await;
        match source.load_file(path).await {
            Ok(image) => {
                self.store_capture(image, &source);
                Ok(())
            }
            Err(err) => {
                self.sync_capture_state(&source);
                self.record_error(&err);
                Err(err)
            }
        }
    }

    /// Camera entry points for embedders that supply a real `CameraDevice`.
    /// The CLI ships with `NoCameraDevice` and never calls them.
    #[allow(dead_code)]
    pub async fn start_camera(&self) -> Result<(), StepError> {
        let mut source = self.capture.lock().await;
        {
            let mut state = self.state.lock();
            state.error = None;
            state.capture_state = CaptureState::CameraRequested;
        }
        let result = source.start_camera().await;
        self.sync_capture_state(&source);
        if let Err(err) = &result {
            self.record_error(err);
        }
        result
    }

    #[allow(dead_code)]
    pub async fn capture_photo(&self) -> Result<(), StepError> {
        let mut source = self.capture.lock().await;
        match source.capture() {
            Ok(image) => {
                self.store_capture(image, &source);
                Ok(())
            }
            Err(err) => {
                self.sync_capture_state(&source);
                self.record_error(&err);
                Err(err)
            }
        }
    }

    #[allow(dead_code)]
    pub async fn stop_camera(&self) {
        let mut source = self.capture.lock().await;
        source.stop_camera();
        self.sync_capture_state(&source);
    }

    /// Runs describe then redesign. A second call while one is in flight is
    /// a no-op, and the first failing step halts the sequence.
    pub async fn generate(&self) -> GenerateOutcome {
        let (image, instruction, epoch) = {
            let mut state = self.state.lock();
            if !state.can_generate() {
                debug!(
                    "generate ignored (captured={}, in_flight={})",
                    state.captured.is_some(),
                    state.in_flight
                );
                return GenerateOutcome::Ignored;
            }
            let Some(image) = state.captured.clone() else {
                return GenerateOutcome::Ignored;
            };
            state.in_flight = true;
            state.error = None;
            (image, state.instruction.clone(), state.epoch)
        };

        if instruction.is_blank() {
            return self.finish(
                epoch,
                Err(StepError::MissingInput(
                    "Please describe how you want to redesign the space.".to_string(),
                )),
            );
        }

        info!("Generating redesign from {:?} image", image.origin);
        let description = match self.api.describe(&image).await {
            Ok(description) => description,
            Err(err) => return self.finish(epoch, Err(err)),
        };

        {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                return GenerateOutcome::Discarded;
            }
            state.description = Some(description.clone());
        }

        let result = self.api.redesign(&description, &instruction).await;
        self.finish(epoch, result)
    }

    fn finish(
        &self,
        epoch: u64,
        result: Result<GeneratedImageResult, StepError>,
    ) -> GenerateOutcome {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            debug!("Dropping result of a sequence that outlived a reset");
            return GenerateOutcome::Discarded;
        }
        state.in_flight = false;
        match result {
            Ok(generated) => {
                state.result = Some(generated.clone());
                state.error = None;
                GenerateOutcome::Completed(generated)
            }
            Err(err) => {
                warn!("Redesign sequence failed ({}): {}", err.kind(), err);
                state.error = Some(err.to_string());
                GenerateOutcome::Failed(err)
            }
        }
    }

    /// Back to the initial state from anywhere. The instruction text is kept.
    ///
    /// The capture source is locked first so a load or snapshot that is
    /// still running cannot store its image after the state was cleared.
    pub async fn reset(&self) {
        let mut source = self.capture.lock().await;
        source.reset();
        let mut state = self.state.lock();
        let instruction = state.instruction.clone();
        let epoch = state.epoch + 1;
        *state = WorkflowState::initial(instruction);
        state.epoch = epoch;
        state.capture_state = source.state();
        info!("Workflow reset");
    }
}
