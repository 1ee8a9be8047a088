pub mod erc20;
pub mod factory;
pub mod pool;
pub mod position_manager;

pub use erc20::IERC20;
pub use factory::IUniswapV3Factory;
pub use pool::IUniswapV3Pool;
pub use position_manager::{
    Collect, DecreaseLiquidity, INonfungiblePositionManager, IncreaseLiquidity,
};
