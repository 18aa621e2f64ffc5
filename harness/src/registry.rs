use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    str::FromStr,
};

use serde::Deserialize;

use crate::{
    BenchErr, Result,
    data::BatchSource,
    error::{ModelResult, Stage},
    model::Model,
};

/// The broad kind of network a model is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelFamily {
    Cnn,
    Mlp,
    Rnn,
}

/// Every model the suite knows how to benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub enum ModelType {
    AlexNet,
    LeNet,
    Vgg16,
    GoogLeNet,
    SimpleMlp,
    W2vSentiment,
}

impl ModelType {
    pub const ALL: [ModelType; 6] = [
        ModelType::AlexNet,
        ModelType::LeNet,
        ModelType::Vgg16,
        ModelType::GoogLeNet,
        ModelType::SimpleMlp,
        ModelType::W2vSentiment,
    ];

    pub fn family(self) -> ModelFamily {
        match self {
            ModelType::AlexNet | ModelType::LeNet | ModelType::Vgg16 | ModelType::GoogLeNet => {
                ModelFamily::Cnn
            }
            ModelType::SimpleMlp => ModelFamily::Mlp,
            ModelType::W2vSentiment => ModelFamily::Rnn,
        }
    }

    /// The name used in reports.
    pub fn name(self) -> &'static str {
        match self {
            ModelType::AlexNet => "AlexNet",
            ModelType::LeNet => "LeNet",
            ModelType::Vgg16 => "VGG16",
            ModelType::GoogLeNet => "GoogLeNet",
            ModelType::SimpleMlp => "SimpleMLP",
            ModelType::W2vSentiment => "W2VSentiment",
        }
    }

    fn tag(self) -> &'static str {
        match self {
            ModelType::AlexNet => "alexnet",
            ModelType::LeNet => "lenet",
            ModelType::Vgg16 => "vgg16",
            ModelType::GoogLeNet => "googlenet",
            ModelType::SimpleMlp => "simple_mlp",
            ModelType::W2vSentiment => "w2v_sentiment",
        }
    }
}

impl Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelType {
    type Err = BenchErr;

    fn from_str(s: &str) -> Result<Self> {
        let tag = s.trim().to_ascii_lowercase();
        ModelType::ALL
            .into_iter()
            .find(|ty| ty.tag() == tag)
            .ok_or_else(|| BenchErr::InvalidConfig(format!("unknown model type {s:?}")))
    }
}

impl TryFrom<String> for ModelType {
    type Error = BenchErr;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Which models a run benchmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum ModelSelection {
    All,
    Cnn,
    Rnn,
    Single(ModelType),
}

impl ModelSelection {
    fn includes(self, ty: ModelType) -> bool {
        match self {
            ModelSelection::All => true,
            ModelSelection::Cnn => ty.family() == ModelFamily::Cnn,
            ModelSelection::Rnn => ty.family() == ModelFamily::Rnn,
            ModelSelection::Single(selected) => selected == ty,
        }
    }
}

impl Display for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSelection::All => f.write_str("ALL"),
            ModelSelection::Cnn => f.write_str("CNN"),
            ModelSelection::Rnn => f.write_str("RNN"),
            ModelSelection::Single(ty) => ty.fmt(f),
        }
    }
}

impl FromStr for ModelSelection {
    type Err = BenchErr;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(ModelSelection::All),
            "cnn" => Ok(ModelSelection::Cnn),
            "rnn" => Ok(ModelSelection::Rnn),
            _ => s.parse().map(ModelSelection::Single),
        }
    }
}

impl TryFrom<String> for ModelSelection {
    type Error = BenchErr;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// The datasets a benchmark can run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Cifar10,
    Mnist,
    TinyImageNet,
    Custom,
    ImdbSentiment,
}

impl DatasetKind {
    pub fn name(self) -> &'static str {
        match self {
            DatasetKind::Cifar10 => "CIFAR-10",
            DatasetKind::Mnist => "MNIST",
            DatasetKind::TinyImageNet => "TinyImageNet",
            DatasetKind::Custom => "Custom",
            DatasetKind::ImdbSentiment => "IMDB Sentiment",
        }
    }

    pub fn is_image(self) -> bool {
        !matches!(self, DatasetKind::ImdbSentiment)
    }

    fn accepts(self, family: ModelFamily) -> bool {
        match self {
            DatasetKind::Cifar10 | DatasetKind::TinyImageNet | DatasetKind::Custom => {
                family == ModelFamily::Cnn
            }
            DatasetKind::Mnist => matches!(family, ModelFamily::Cnn | ModelFamily::Mlp),
            DatasetKind::ImdbSentiment => family == ModelFamily::Rnn,
        }
    }

    /// Checks that `selection` makes sense for this dataset.
    ///
    /// Touches no data, so it can run before anything is loaded.
    ///
    /// # Errors
    /// `BenchErr::UnsupportedPairing` if the selection is `ALL` or names models of a family
    /// this dataset can't feed.
    pub fn check_pairing(self, selection: ModelSelection) -> Result<()> {
        let supported = match selection {
            ModelSelection::All => false,
            ModelSelection::Cnn => self.accepts(ModelFamily::Cnn),
            ModelSelection::Rnn => self.accepts(ModelFamily::Rnn),
            ModelSelection::Single(ty) => self.accepts(ty.family()),
        };

        if supported {
            return Ok(());
        }

        Err(BenchErr::UnsupportedPairing {
            selection: selection.to_string(),
            dataset: self.name().to_string(),
        })
    }

    /// Describes a dataset of this kind batched as `shape`.
    ///
    /// Image datasets read `<name> <batch>x<channels>x<height>x<width>`, text datasets are
    /// described by their name alone.
    pub fn describe(self, shape: &DataShape) -> String {
        if !self.is_image() {
            return self.name().to_string();
        }

        let dims = std::iter::once(shape.batch_size)
            .chain(shape.example.iter().copied())
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("x");

        format!("{} {dims}", self.name())
    }
}

impl Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The shape of the batches a dataset yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataShape {
    pub batch_size: usize,
    /// Dimensions of one example, without the leading batch dimension.
    pub example: Vec<usize>,
    pub labels: usize,
}

/// Knows how to describe and open one dataset.
pub trait DatasetLoader {
    fn kind(&self) -> DatasetKind;

    fn shape(&self) -> DataShape;

    fn description(&self) -> String {
        self.kind().describe(&self.shape())
    }

    /// Opens the dataset.
    ///
    /// # Errors
    /// `BenchErr::DatasetMissing` if a mandatory location doesn't exist.
    fn load(&mut self) -> Result<Box<dyn BatchSource>>;
}

/// What a factory needs to build a model for a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelShape {
    pub example: Vec<usize>,
    pub labels: usize,
    pub seed: u64,
}

pub type ModelFactory = Box<dyn Fn(&ModelShape) -> ModelResult<Box<dyn Model>> + Send + Sync>;

/// Maps model types to the factories that build them.
///
/// Built once per process and handed to whoever needs to build models.
#[derive(Default)]
pub struct ModelRegistry {
    factories: BTreeMap<ModelType, ModelFactory>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` for `ty`, replacing any previous one.
    pub fn register<F>(&mut self, ty: ModelType, factory: F) -> &mut Self
    where
        F: Fn(&ModelShape) -> ModelResult<Box<dyn Model>> + Send + Sync + 'static,
    {
        self.factories.insert(ty, Box::new(factory));
        self
    }

    pub fn is_registered(&self, ty: ModelType) -> bool {
        self.factories.contains_key(&ty)
    }

    /// Expands `selection` into the registered models it names.
    ///
    /// # Errors
    /// * `BenchErr::MissingFactory` if a single selected model isn't registered.
    /// * `BenchErr::NoModelsSelected` if a group resolves to nothing.
    pub fn select(&self, selection: ModelSelection) -> Result<Vec<ModelType>> {
        if let ModelSelection::Single(ty) = selection {
            if !self.is_registered(ty) {
                return Err(BenchErr::MissingFactory {
                    model: ty.to_string(),
                });
            }
        }

        let selected: Vec<_> = self
            .factories
            .keys()
            .copied()
            .filter(|&ty| selection.includes(ty))
            .collect();

        if selected.is_empty() {
            return Err(BenchErr::NoModelsSelected);
        }

        Ok(selected)
    }

    /// Builds a fresh `ty` model shaped after `shape`.
    pub fn build(&self, ty: ModelType, shape: &ModelShape) -> Result<Box<dyn Model>> {
        let factory = self.factories.get(&ty).ok_or_else(|| BenchErr::MissingFactory {
            model: ty.to_string(),
        })?;

        factory(shape).map_err(BenchErr::at(Stage::DeviceSetup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelErr;

    fn registry(types: &[ModelType]) -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        for &ty in types {
            registry.register(ty, |_| Err(ModelErr::Failure("not buildable".into())));
        }
        registry
    }

    #[test]
    fn selections_parse_from_tags() {
        assert_eq!("ALL".parse::<ModelSelection>().unwrap(), ModelSelection::All);
        assert_eq!("cnn".parse::<ModelSelection>().unwrap(), ModelSelection::Cnn);
        assert_eq!(
            "simple_mlp".parse::<ModelSelection>().unwrap(),
            ModelSelection::Single(ModelType::SimpleMlp)
        );
        assert!("resnet".parse::<ModelSelection>().is_err());
    }

    #[test]
    fn image_datasets_reject_recurrent_models() {
        for kind in [DatasetKind::Cifar10, DatasetKind::TinyImageNet, DatasetKind::Custom] {
            assert!(kind.check_pairing(ModelSelection::Cnn).is_ok());
            assert!(kind.check_pairing(ModelSelection::Rnn).is_err());
            assert!(kind.check_pairing(ModelSelection::Single(ModelType::W2vSentiment)).is_err());
            assert!(kind.check_pairing(ModelSelection::Single(ModelType::SimpleMlp)).is_err());
        }
    }

    #[test]
    fn mnist_accepts_convolutional_and_dense_models() {
        let mnist = DatasetKind::Mnist;
        assert!(mnist.check_pairing(ModelSelection::Single(ModelType::LeNet)).is_ok());
        assert!(mnist.check_pairing(ModelSelection::Single(ModelType::SimpleMlp)).is_ok());
        assert!(mnist.check_pairing(ModelSelection::Rnn).is_err());
    }

    #[test]
    fn text_datasets_reject_convolutional_models() {
        let imdb = DatasetKind::ImdbSentiment;
        assert!(imdb.check_pairing(ModelSelection::Rnn).is_ok());
        assert!(imdb.check_pairing(ModelSelection::Cnn).is_err());
    }

    #[test]
    fn selecting_everything_is_never_a_valid_pairing() {
        let err = DatasetKind::Mnist
            .check_pairing(ModelSelection::All)
            .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("ALL"));
    }

    #[test]
    fn groups_expand_to_registered_models_only() {
        let registry = registry(&[ModelType::LeNet, ModelType::AlexNet, ModelType::SimpleMlp]);
        assert_eq!(
            registry.select(ModelSelection::Cnn).unwrap(),
            vec![ModelType::AlexNet, ModelType::LeNet]
        );
        assert!(matches!(
            registry.select(ModelSelection::Rnn),
            Err(BenchErr::NoModelsSelected)
        ));
        assert!(matches!(
            registry.select(ModelSelection::Single(ModelType::Vgg16)),
            Err(BenchErr::MissingFactory { .. })
        ));
    }

    #[test]
    fn factory_failures_are_device_setup_errors() {
        let registry = registry(&[ModelType::LeNet]);
        let shape = ModelShape {
            example: vec![1, 28, 28],
            labels: 10,
            seed: 0,
        };
        let err = registry.build(ModelType::LeNet, &shape).err().unwrap();
        assert!(err.to_string().starts_with("device setup"));
    }

    #[test]
    fn image_descriptions_list_every_dimension() {
        let shape = DataShape {
            batch_size: 128,
            example: vec![3, 32, 32],
            labels: 10,
        };
        assert_eq!(DatasetKind::Cifar10.describe(&shape), "CIFAR-10 128x3x32x32");
        assert_eq!(DatasetKind::ImdbSentiment.describe(&shape), "IMDB Sentiment");
    }
}
