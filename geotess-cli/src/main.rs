mod extract;

use clap::{Args, Parser, Subcommand, ValueEnum};
use geotess_interp::{HorizontalInterpolator, RadialInterpolator};
use geotess_model::{ExtensionRegistry, Model};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "geotess")]
#[command(about = "Query and extract values from triangulated earth models", long_about = None)]
struct Cli {
    /// Model file to load (binary or ASCII)
    #[arg(value_name = "MODEL")]
    model: PathBuf,

    /// Show verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display summary information about the model and its grid
    Info,

    /// Sample one or more attributes on a lat/lon grid at fixed depth
    MapValuesDepth {
        /// Depth below the surface in km
        #[arg(long)]
        depth: f64,

        #[command(flatten)]
        window: Window,

        #[command(flatten)]
        interp: Interp,

        /// Attribute indices to report (all attributes when omitted)
        #[arg(long, value_delimiter = ',')]
        attributes: Vec<usize>,
    },

    /// Sample attributes on a lat/lon grid at a fractional position
    /// within a layer (0 = bottom, 1 = top)
    MapValuesLayer {
        /// Layer index or name
        #[arg(long)]
        layer: String,

        /// Radial position within the layer
        #[arg(long, default_value = "0.5")]
        fraction: f64,

        #[command(flatten)]
        window: Window,

        #[command(flatten)]
        interp: Interp,

        /// Attribute indices to report (all attributes when omitted)
        #[arg(long, value_delimiter = ',')]
        attributes: Vec<usize>,
    },

    /// Map the radius (or depth) of a layer boundary
    MapLayerBoundary {
        /// Layer index or name
        #[arg(long)]
        layer: String,

        /// Which boundary of the layer
        #[arg(long, value_enum, default_value = "top")]
        boundary: Boundary,

        /// Report depth below the surface instead of radius
        #[arg(long)]
        as_depth: bool,

        #[command(flatten)]
        window: Window,

        #[command(flatten)]
        interp: Interp,
    },

    /// Map the radial thickness of a layer
    MapLayerThickness {
        /// Layer index or name
        #[arg(long)]
        layer: String,

        #[command(flatten)]
        window: Window,

        #[command(flatten)]
        interp: Interp,
    },

    /// Sample attributes on a 3D lat/lon/depth block
    Values3dBlock {
        #[command(flatten)]
        window: Window,

        /// First depth in km
        #[arg(long)]
        depth_first: f64,

        /// Last depth in km
        #[arg(long)]
        depth_last: f64,

        /// Number of depth samples
        #[arg(long, default_value = "10")]
        ndepth: usize,

        #[command(flatten)]
        interp: Interp,

        /// Attribute indices to report (all attributes when omitted)
        #[arg(long, value_delimiter = ',')]
        attributes: Vec<usize>,
    },

    /// Sample a vertical slice along the great circle between two points
    Slice {
        /// First point latitude in degrees
        #[arg(long)]
        lat1: f64,
        /// First point longitude in degrees
        #[arg(long)]
        lon1: f64,
        /// Last point latitude in degrees
        #[arg(long)]
        lat2: f64,
        /// Last point longitude in degrees
        #[arg(long)]
        lon2: f64,

        /// Number of points along the arc
        #[arg(long, default_value = "100")]
        npoints: usize,

        /// First depth in km
        #[arg(long)]
        depth_first: f64,

        /// Last depth in km
        #[arg(long)]
        depth_last: f64,

        /// Number of depth samples
        #[arg(long, default_value = "50")]
        ndepth: usize,

        #[command(flatten)]
        interp: Interp,

        /// Attribute indices to report (all attributes when omitted)
        #[arg(long, value_delimiter = ',')]
        attributes: Vec<usize>,
    },

    /// Sample a radial borehole at one geographic position
    Borehole {
        /// Latitude in degrees
        #[arg(long)]
        lat: f64,
        /// Longitude in degrees
        #[arg(long)]
        lon: f64,

        /// Maximum radial spacing between samples in km
        #[arg(long, default_value = "100")]
        max_spacing: f64,

        /// Deepest layer to sample (index or name; bottom of the model
        /// when omitted)
        #[arg(long)]
        first_layer: Option<String>,

        /// Shallowest layer to sample
        #[arg(long)]
        last_layer: Option<String>,

        #[command(flatten)]
        interp: Interp,

        /// Attribute indices to report (all attributes when omitted)
        #[arg(long, value_delimiter = ',')]
        attributes: Vec<usize>,
    },
}

/// Rectangular lat/lon sampling window
#[derive(Args)]
struct Window {
    /// First latitude in degrees
    #[arg(long, default_value = "-90", allow_hyphen_values = true)]
    lat_first: f64,

    /// Last latitude in degrees
    #[arg(long, default_value = "90", allow_hyphen_values = true)]
    lat_last: f64,

    /// Number of latitude samples
    #[arg(long, default_value = "37")]
    nlat: usize,

    /// First longitude in degrees
    #[arg(long, default_value = "-180", allow_hyphen_values = true)]
    lon_first: f64,

    /// Last longitude in degrees
    #[arg(long, default_value = "180", allow_hyphen_values = true)]
    lon_last: f64,

    /// Number of longitude samples
    #[arg(long, default_value = "73")]
    nlon: usize,
}

/// Interpolator selection
#[derive(Args)]
struct Interp {
    /// Horizontal interpolator
    #[arg(long, value_enum, default_value = "linear")]
    horizontal: HorizKind,

    /// Radial interpolator
    #[arg(long, value_enum, default_value = "linear")]
    radial: RadialKind,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum HorizKind {
    Linear,
    NaturalNeighbor,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum RadialKind {
    Linear,
    CubicSpline,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Boundary {
    Top,
    Bottom,
}

impl Interp {
    fn horizontal(&self) -> HorizontalInterpolator {
        match self.horizontal {
            HorizKind::Linear => HorizontalInterpolator::Linear,
            HorizKind::NaturalNeighbor => HorizontalInterpolator::NaturalNeighbor,
        }
    }

    fn radial(&self) -> RadialInterpolator {
        match self.radial {
            RadialKind::Linear => RadialInterpolator::Linear,
            RadialKind::CubicSpline => RadialInterpolator::CubicSpline,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logger
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let registry = ExtensionRegistry::new();
    let model = match Model::read_file(&cli.model, &registry) {
        Ok(model) => model,
        Err(e) => {
            eprintln!("Error reading model: {}", e);
            std::process::exit(1);
        }
    };

    let result = match &cli.command {
        Commands::Info => extract::info(&model),
        Commands::MapValuesDepth {
            depth,
            window,
            interp,
            attributes,
        } => extract::map_values_depth(&model, *depth, window, interp, attributes),
        Commands::MapValuesLayer {
            layer,
            fraction,
            window,
            interp,
            attributes,
        } => extract::map_values_layer(&model, layer, *fraction, window, interp, attributes),
        Commands::MapLayerBoundary {
            layer,
            boundary,
            as_depth,
            window,
            interp,
        } => extract::map_layer_boundary(
            &model,
            layer,
            *boundary == Boundary::Top,
            *as_depth,
            window,
            interp,
        ),
        Commands::MapLayerThickness {
            layer,
            window,
            interp,
        } => extract::map_layer_thickness(&model, layer, window, interp),
        Commands::Values3dBlock {
            window,
            depth_first,
            depth_last,
            ndepth,
            interp,
            attributes,
        } => extract::values_3d_block(
            &model,
            window,
            *depth_first,
            *depth_last,
            *ndepth,
            interp,
            attributes,
        ),
        Commands::Slice {
            lat1,
            lon1,
            lat2,
            lon2,
            npoints,
            depth_first,
            depth_last,
            ndepth,
            interp,
            attributes,
        } => extract::slice(
            &model,
            (*lat1, *lon1),
            (*lat2, *lon2),
            *npoints,
            *depth_first,
            *depth_last,
            *ndepth,
            interp,
            attributes,
        ),
        Commands::Borehole {
            lat,
            lon,
            max_spacing,
            first_layer,
            last_layer,
            interp,
            attributes,
        } => extract::borehole(
            &model,
            *lat,
            *lon,
            *max_spacing,
            first_layer.as_deref(),
            last_layer.as_deref(),
            interp,
            attributes,
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
