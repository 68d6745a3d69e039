/// Which phase the model and input pipeline run in.
///
/// `Train` turns on random crops, colour distortion, dropout and
/// shuffled input. `Eval` reads shards once in a fixed order.
/// `Inference` feeds one image at a time to the beam search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
    Inference,
}

impl Mode {
    pub fn is_training(self) -> bool {
        matches!(self, Mode::Train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_train_is_training() {
        assert!(Mode::Train.is_training());
        assert!(!Mode::Eval.is_training());
        assert!(!Mode::Inference.is_training());
    }
}
