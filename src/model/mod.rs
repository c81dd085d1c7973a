pub mod series;

pub use series::ForecastSeries;
